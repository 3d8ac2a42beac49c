use actix::prelude::*;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::configure::{ConfigOptions, ConfigState};
use crate::service::{InitKeys, InitOptions, ProxyError, SealState, Service, UnsealOptions};

/// Notifications about completed operations. Key material is never included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProxyEvent {
    Initialized {
        secret_shares: usize,
        root_holder_recorded: bool,
    },
    Unsealed {
        sealed: bool,
        progress: u32,
        threshold: u32,
    },
    Configured {
        config_id: String,
        mounts_changed: bool,
        auths_changed: bool,
        policies_changed: bool,
    },
    Error(String),
}

/// Hosts the service facade so other actors can reach it by message.
#[derive(Clone)]
pub struct ProxyActor {
    service: Arc<dyn Service>,
    pub event_sender: Option<broadcast::Sender<ProxyEvent>>,
}

impl ProxyActor {
    pub fn new(
        service: Arc<dyn Service>,
        event_sender: Option<broadcast::Sender<ProxyEvent>>,
    ) -> Self {
        Self {
            service,
            event_sender,
        }
    }

    pub fn service(&self) -> Arc<dyn Service> {
        self.service.clone()
    }

    fn emit(&self, event: ProxyEvent) {
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(event);
        }
    }

    fn emit_error(&self, err: &ProxyError) {
        self.emit(ProxyEvent::Error(err.to_string()));
    }
}

impl Actor for ProxyActor {
    type Context = Context<Self>;
}

// -----------------------------------------------------------------------------
// Actor messages & handlers
// -----------------------------------------------------------------------------

#[derive(Message, Debug, Clone)]
#[rtype(result = "Result<bool, ProxyError>")]
pub struct InitStatus;

impl Handler<InitStatus> for ProxyActor {
    type Result = ResponseFuture<Result<bool, ProxyError>>;

    fn handle(&mut self, _msg: InitStatus, _ctx: &mut Context<Self>) -> Self::Result {
        let actor = self.clone();
        async move {
            let result = actor.service.init_status().await;
            if let Err(e) = &result {
                actor.emit_error(e);
            }
            result
        }
        .boxed_local()
    }
}

#[derive(Message, Debug, Clone)]
#[rtype(result = "Result<InitKeys, ProxyError>")]
pub struct InitVault(pub InitOptions);

impl Handler<InitVault> for ProxyActor {
    type Result = ResponseFuture<Result<InitKeys, ProxyError>>;

    fn handle(&mut self, msg: InitVault, _ctx: &mut Context<Self>) -> Self::Result {
        let actor = self.clone();
        async move {
            let root_holder_recorded = !msg.0.root_token_holder_email.is_empty();
            match actor.service.init(msg.0).await {
                Ok(keys) => {
                    actor.emit(ProxyEvent::Initialized {
                        secret_shares: keys.keys.len(),
                        root_holder_recorded,
                    });
                    Ok(keys)
                }
                Err(e) => {
                    actor.emit_error(&e);
                    Err(e)
                }
            }
        }
        .boxed_local()
    }
}

#[derive(Message, Debug, Clone)]
#[rtype(result = "Result<SealState, ProxyError>")]
pub struct SealStatus;

impl Handler<SealStatus> for ProxyActor {
    type Result = ResponseFuture<Result<SealState, ProxyError>>;

    fn handle(&mut self, _msg: SealStatus, _ctx: &mut Context<Self>) -> Self::Result {
        let actor = self.clone();
        async move {
            let result = actor.service.seal_status().await;
            if let Err(e) = &result {
                actor.emit_error(e);
            }
            result
        }
        .boxed_local()
    }
}

#[derive(Message, Debug, Clone)]
#[rtype(result = "Result<SealState, ProxyError>")]
pub struct UnsealVault(pub UnsealOptions);

impl Handler<UnsealVault> for ProxyActor {
    type Result = ResponseFuture<Result<SealState, ProxyError>>;

    fn handle(&mut self, msg: UnsealVault, _ctx: &mut Context<Self>) -> Self::Result {
        let actor = self.clone();
        async move {
            match actor.service.unseal(msg.0).await {
                Ok(state) => {
                    actor.emit(ProxyEvent::Unsealed {
                        sealed: state.sealed,
                        progress: state.progress,
                        threshold: state.t,
                    });
                    Ok(state)
                }
                Err(e) => {
                    actor.emit_error(&e);
                    Err(e)
                }
            }
        }
        .boxed_local()
    }
}

#[derive(Message, Debug, Clone)]
#[rtype(result = "Result<ConfigState, ProxyError>")]
pub struct ConfigureVault(pub ConfigOptions);

impl Handler<ConfigureVault> for ProxyActor {
    type Result = ResponseFuture<Result<ConfigState, ProxyError>>;

    fn handle(&mut self, msg: ConfigureVault, _ctx: &mut Context<Self>) -> Self::Result {
        let actor = self.clone();
        async move {
            match actor.service.configure(msg.0).await {
                Ok(state) => {
                    actor.emit(ProxyEvent::Configured {
                        config_id: state.config_id.clone(),
                        mounts_changed: state.mounts.is_some(),
                        auths_changed: state.auths.is_some(),
                        policies_changed: state.policies.is_some(),
                    });
                    Ok(state)
                }
                Err(e) => {
                    actor.emit_error(&e);
                    Err(e)
                }
            }
        }
        .boxed_local()
    }
}

// -----------------------------------------------------------------------------
// Start the actor with a broadcast channel
// -----------------------------------------------------------------------------

pub fn start_proxy_actor_with_channel(
    service: Arc<dyn Service>,
) -> (Addr<ProxyActor>, broadcast::Receiver<ProxyEvent>) {
    let (tx, rx) = broadcast::channel(16);
    let addr = ProxyActor::new(service, Some(tx)).start();
    (addr, rx)
}
