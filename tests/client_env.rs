//! Vault client settings falling back to the Vault CLI environment.

use serial_test::serial;
use std::env;
use vault_armor::interface::ClientFactory;
use vault_armor::vault::{VaultClientFactory, VaultError, VaultSettings};

const VARS: [&str; 4] = ["VAULT_ADDRESS", "VAULT_ADDR", "VAULT_SKIP_VERIFY", "VAULT_MAX_RETRIES"];

fn clear() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn vault_addr_is_used_when_config_is_silent() {
    clear();
    env::set_var("VAULT_ADDR", "http://vault.test:8200");
    env::set_var("VAULT_MAX_RETRIES", "5");

    let resolved = VaultSettings::default().resolve().unwrap();
    assert_eq!(resolved.address, "http://vault.test:8200");
    assert_eq!(resolved.max_retries, 5);
    clear();
}

#[test]
#[serial]
fn vault_address_beats_vault_addr() {
    clear();
    env::set_var("VAULT_ADDRESS", "http://primary:8200");
    env::set_var("VAULT_ADDR", "http://secondary:8200");

    assert_eq!(
        VaultSettings::default().resolve().unwrap().address,
        "http://primary:8200"
    );
    clear();
}

#[test]
#[serial]
fn malformed_skip_verify_fails_every_connection() {
    clear();
    env::set_var("VAULT_SKIP_VERIFY", "sometimes");

    let factory = VaultClientFactory::new(VaultSettings::default());
    let err = factory.connect(None).err().unwrap();
    assert!(matches!(err, VaultError::Config(_)));

    // An explicit setting never consults the environment.
    let factory = VaultClientFactory::new(VaultSettings {
        skip_verify: Some(true),
        ..Default::default()
    });
    assert!(factory.connect(Some("s.token")).is_ok());
    clear();
}
