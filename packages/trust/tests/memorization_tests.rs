//! Memorization, store state and cache tests

mod common;

use std::sync::Arc;

use common::{memo_options, self_signed_chain};
use netsec_trust::{
    CertificateChain, ChainValidator, DomainMatchRule, HostKeyedStoreCache, KeystoreFile,
    MemorizingStore, MemorizingValidator, StoreState, TrustError,
};
use zeroize::Zeroizing;

const HOST: &str = "memo.test";

fn validator(options: netsec_trust::MemorizationOptions) -> MemorizingValidator {
    MemorizingValidator::new(options).expect("memorizing validator")
}

#[test]
fn tofu_learns_first_chain_and_flags_a_changed_one() {
    let dir = tempfile::tempdir().unwrap();
    let memo = validator(memo_options(&dir));
    let first = self_signed_chain(HOST);
    let second = self_signed_chain(HOST);

    assert_eq!(
        memo.check_server_trusted(&first, "RSA", Some(HOST)).unwrap(),
        first
    );
    let store = memo.cache().get(HOST).unwrap().unwrap();
    assert_eq!(store.state().unwrap(), StoreState::Learned);

    // the same chain keeps validating
    assert!(memo.check_server_trusted(&first, "RSA", Some(HOST)).is_ok());

    let err = memo
        .check_server_trusted(&second, "RSA", Some(HOST))
        .unwrap_err();
    match &err {
        TrustError::MemorizationMismatch { chain, host, cause } => {
            assert_eq!(chain, &second);
            assert_eq!(host, HOST);
            assert!(matches!(**cause, TrustError::NotTrusted(_)));
        }
        other => panic!("expected mismatch, got {other:?}"),
    }
    assert!(err.is_memorization());
}

#[test]
fn without_tofu_unknown_hosts_are_not_memorized() {
    let dir = tempfile::tempdir().unwrap();
    let memo = validator(memo_options(&dir).no_tofu());
    let chain = self_signed_chain(HOST);

    let err = memo
        .check_server_trusted(&chain, "RSA", Some(HOST))
        .unwrap_err();
    assert!(matches!(err, TrustError::NotMemorized { .. }));
    assert_eq!(err.chain(), Some(&chain));
    assert_eq!(err.host(), Some(HOST));

    let store = memo.cache().get(HOST).unwrap().unwrap();
    assert_eq!(store.state().unwrap(), StoreState::Empty);
}

#[test]
fn memorized_chain_survives_a_fresh_reload() {
    let dir = tempfile::tempdir().unwrap();
    let chain = self_signed_chain(HOST);

    {
        let memo = validator(memo_options(&dir).no_tofu());
        memo.memorize(&chain, HOST).unwrap();
    }

    let reloaded = validator(memo_options(&dir).no_tofu());
    assert!(reloaded
        .check_server_trusted(&chain, "RSA", Some(HOST))
        .is_ok());

    reloaded.clear(HOST, true).unwrap();

    let after_clear = validator(memo_options(&dir).no_tofu());
    let err = after_clear
        .check_server_trusted(&chain, "RSA", Some(HOST))
        .unwrap_err();
    assert!(matches!(err, TrustError::NotMemorized { .. }));
}

#[test]
fn rejections_can_be_approved() {
    let dir = tempfile::tempdir().unwrap();
    let memo = validator(memo_options(&dir).no_tofu());
    let chain = self_signed_chain(HOST);

    let rejection = memo
        .check_server_trusted(&chain, "RSA", Some(HOST))
        .unwrap_err();
    memo.memorize_rejection(&rejection).unwrap();

    assert!(memo.check_server_trusted(&chain, "RSA", Some(HOST)).is_ok());
}

#[test]
fn approving_a_non_memorization_error_fails() {
    let dir = tempfile::tempdir().unwrap();
    let memo = validator(memo_options(&dir));

    let err = memo
        .memorize_rejection(&TrustError::NotTrusted("nope".to_string()))
        .unwrap_err();
    assert!(matches!(err, TrustError::Configuration(_)));
}

#[test]
fn transient_approval_is_lost_on_eviction_but_persistent_is_not() {
    let dir = tempfile::tempdir().unwrap();
    let memo = validator(memo_options(&dir).no_tofu().cache_size(1));
    let transient = self_signed_chain("transient.test");
    let persistent = self_signed_chain("persistent.test");

    let rejection = memo
        .check_server_trusted(&transient, "RSA", Some("transient.test"))
        .unwrap_err();
    memo.memorize_rejection_for_now(&rejection).unwrap();
    assert!(memo
        .check_server_trusted(&transient, "RSA", Some("transient.test"))
        .is_ok());

    // opening a second host evicts the first
    memo.memorize(&persistent, "persistent.test").unwrap();
    assert!(!memo.cache().contains("transient.test").unwrap());
    assert_eq!(memo.cache().len().unwrap(), 1);

    let err = memo
        .check_server_trusted(&transient, "RSA", Some("transient.test"))
        .unwrap_err();
    assert!(matches!(err, TrustError::NotMemorized { .. }));

    // the persistent host was evicted by that check, and is reloaded from disk
    assert!(!memo.cache().contains("persistent.test").unwrap());
    assert!(memo
        .check_server_trusted(&persistent, "RSA", Some("persistent.test"))
        .is_ok());
}

#[test]
fn transient_mismatch_reports_the_transient_cause() {
    let dir = tempfile::tempdir().unwrap();
    let memo = validator(memo_options(&dir).no_tofu());
    let approved = self_signed_chain(HOST);
    let other = self_signed_chain(HOST);

    memo.memorize_for_now(&approved, HOST).unwrap();
    let err = memo
        .check_server_trusted(&other, "RSA", Some(HOST))
        .unwrap_err();
    assert!(matches!(err, TrustError::MemorizationMismatch { .. }));

    // clearing only the transient tier returns the host to unknown
    memo.clear(HOST, false).unwrap();
    let err = memo
        .check_server_trusted(&approved, "RSA", Some(HOST))
        .unwrap_err();
    assert!(matches!(err, TrustError::NotMemorized { .. }));
}

#[test]
fn hosts_outside_the_domain_rule_are_not_covered() {
    let dir = tempfile::tempdir().unwrap();
    let rule = DomainMatchRule::whitelist(["*.memo.test"]).unwrap();
    let memo = validator(memo_options(&dir).no_tofu().for_domains(rule));
    let chain = self_signed_chain("elsewhere.test");

    assert!(!memo.covers("elsewhere.test"));
    assert!(memo.covers("www.memo.test"));
    assert!(!memo.applies_to(Some("elsewhere.test")));
    assert!(memo.applies_to(Some("WWW.Memo.Test.")));
    assert!(memo.applies_to(None));

    // a direct check never accepts a host it does not cover
    let err = memo
        .check_server_trusted(&chain, "RSA", Some("elsewhere.test"))
        .unwrap_err();
    assert!(matches!(err, TrustError::NotTrusted(_)));
    assert!(memo.cache().is_empty().unwrap());

    let err = memo
        .check_server_trusted(&chain, "RSA", Some("www.memo.test"))
        .unwrap_err();
    assert!(matches!(err, TrustError::NotMemorized { .. }));
}

#[test]
fn hostname_is_required_and_case_insensitive() {
    let dir = tempfile::tempdir().unwrap();
    let memo = validator(memo_options(&dir));
    let chain = self_signed_chain(HOST);

    let err = memo.check_server_trusted(&chain, "RSA", None).unwrap_err();
    assert!(matches!(err, TrustError::NotTrusted(_)));

    memo.check_server_trusted(&chain, "RSA", Some("MEMO.test"))
        .unwrap();
    assert!(memo.cache().contains(HOST).unwrap());
    assert!(memo.check_server_trusted(&chain, "RSA", Some(HOST)).is_ok());
}

#[test]
fn empty_chains_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let memo = validator(memo_options(&dir));

    let err = memo
        .check_server_trusted(&CertificateChain::default(), "RSA", Some(HOST))
        .unwrap_err();
    assert!(matches!(err, TrustError::NotTrusted(_)));
}

#[test]
fn client_checks_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let memo = validator(memo_options(&dir));
    assert!(memo
        .check_client_trusted(&self_signed_chain(HOST), "RSA")
        .is_err());
}

#[test]
fn clear_all_removes_every_keystore() {
    let dir = tempfile::tempdir().unwrap();
    let first = self_signed_chain("one.test");
    let second = self_signed_chain("two.test");

    let memo = validator(memo_options(&dir).no_tofu().cache_size(1));
    memo.memorize(&first, "one.test").unwrap();
    memo.memorize(&second, "two.test").unwrap();

    let keystores = |dir: &std::path::Path| {
        std::fs::read_dir(dir)
            .unwrap()
            .filter(|entry| {
                entry
                    .as_ref()
                    .unwrap()
                    .path()
                    .extension()
                    .is_some_and(|ext| ext == "keystore")
            })
            .count()
    };
    let working_dir = dir.path().join("memo");
    assert_eq!(keystores(&working_dir), 2);

    memo.clear_all(true).unwrap();
    assert_eq!(keystores(&working_dir), 0);

    for (chain, host) in [(&first, "one.test"), (&second, "two.test")] {
        let err = memo
            .check_server_trusted(chain, "RSA", Some(host))
            .unwrap_err();
        assert!(matches!(err, TrustError::NotMemorized { .. }));
    }
}

#[test]
fn zero_capacity_cache_is_rejected() {
    let dir = tempfile::tempdir().unwrap();

    let err = MemorizingValidator::new(memo_options(&dir).cache_size(0)).unwrap_err();
    assert!(matches!(err, TrustError::Configuration(_)));

    let password = Arc::new(Zeroizing::new("pw".to_string()));
    assert!(HostKeyedStoreCache::new(dir.path(), password, 0).is_err());
}

#[test]
fn cache_evicts_least_recently_used_host() {
    let dir = tempfile::tempdir().unwrap();
    let password = Arc::new(Zeroizing::new("pw".to_string()));
    let cache = HostKeyedStoreCache::new(dir.path(), password, 2).unwrap();

    cache.get_or_create("a.test").unwrap();
    cache.get_or_create("b.test").unwrap();
    // touch a so b becomes the oldest
    cache.get("a.test").unwrap();
    cache.get_or_create("c.test").unwrap();

    assert!(cache.contains("a.test").unwrap());
    assert!(!cache.contains("b.test").unwrap());
    assert!(cache.contains("c.test").unwrap());
    assert_eq!(cache.capacity(), 2);

    assert!(cache.evict("a.test").unwrap());
    assert!(!cache.evict("a.test").unwrap());
    assert_eq!(cache.len().unwrap(), 1);
}

#[test]
fn cache_returns_one_store_per_host() {
    let dir = tempfile::tempdir().unwrap();
    let password = Arc::new(Zeroizing::new("pw".to_string()));
    let cache = HostKeyedStoreCache::new(dir.path(), password, 4).unwrap();

    let first = cache.get_or_create("same.test").unwrap();
    let second = cache.get_or_create("same.test").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn store_state_machine() {
    let dir = tempfile::tempdir().unwrap();
    let password = Arc::new(Zeroizing::new("pw".to_string()));
    let keystore = KeystoreFile::for_host(dir.path(), HOST, password);
    let store = MemorizingStore::open(HOST, keystore).unwrap();
    let chain = self_signed_chain(HOST);

    assert_eq!(store.host(), HOST);
    assert_eq!(store.state().unwrap(), StoreState::Empty);

    let err = store.check_server_trusted(&chain, "RSA", false).unwrap_err();
    assert!(matches!(err, TrustError::NotMemorized { .. }));
    assert!(!store.keystore().exists());

    store.check_server_trusted(&chain, "RSA", true).unwrap();
    assert_eq!(store.state().unwrap(), StoreState::Learned);
    assert!(store.keystore().exists());

    store.clear(true).unwrap();
    assert_eq!(store.state().unwrap(), StoreState::Empty);
    assert!(!store.keystore().exists());
}

#[test]
fn concurrent_memorization_for_one_host_loses_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let memo = Arc::new(validator(memo_options(&dir).no_tofu()));
    let chains: Vec<CertificateChain> = (0..6).map(|_| self_signed_chain(HOST)).collect();

    let handles: Vec<_> = chains
        .iter()
        .cloned()
        .map(|chain| {
            let memo = Arc::clone(&memo);
            std::thread::spawn(move || memo.memorize(&chain, HOST).unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let reloaded = validator(memo_options(&dir).no_tofu());
    for chain in &chains {
        assert!(reloaded.check_server_trusted(chain, "RSA", Some(HOST)).is_ok());
    }
}

#[test]
fn concurrent_first_use_learns_exactly_one_chain() {
    let dir = tempfile::tempdir().unwrap();
    let memo = Arc::new(validator(memo_options(&dir)));
    let chains: Vec<CertificateChain> = (0..4).map(|_| self_signed_chain(HOST)).collect();

    let handles: Vec<_> = chains
        .iter()
        .cloned()
        .map(|chain| {
            let memo = Arc::clone(&memo);
            std::thread::spawn(move || memo.check_server_trusted(&chain, "RSA", Some(HOST)).is_ok())
        })
        .collect();
    let accepted = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|accepted| *accepted)
        .count();

    assert_eq!(accepted, 1);
}

#[test]
fn concurrent_hosts_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let memo = Arc::new(validator(memo_options(&dir)));

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let memo = Arc::clone(&memo);
            std::thread::spawn(move || {
                let host = format!("host{i}.test");
                let chain = self_signed_chain(&host);
                for _ in 0..3 {
                    memo.check_server_trusted(&chain, "RSA", Some(&host)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(memo.cache().len().unwrap(), 6);
}

#[test]
fn store_held_across_eviction_is_reused_without_losing_approvals() {
    let dir = tempfile::tempdir().unwrap();
    let memo = validator(memo_options(&dir).no_tofu().cache_size(1));
    let first = self_signed_chain("h.test");
    let second = self_signed_chain("h.test");

    let in_flight = memo.cache().get_or_create("h.test").unwrap();
    memo.cache().get_or_create("other.test").unwrap();
    assert!(!memo.cache().contains("h.test").unwrap());

    memo.memorize(&first, "h.test").unwrap();
    in_flight.memorize(&second).unwrap();

    let reused = memo.cache().get_or_create("h.test").unwrap();
    assert!(Arc::ptr_eq(&in_flight, &reused));

    // both approvals survive a reload from disk
    drop((in_flight, reused));
    let reloaded = validator(memo_options(&dir).no_tofu());
    assert!(reloaded
        .check_server_trusted(&first, "RSA", Some("h.test"))
        .is_ok());
    assert!(reloaded
        .check_server_trusted(&second, "RSA", Some("h.test"))
        .is_ok());
}

#[test]
fn evicted_store_nobody_holds_is_reopened_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let password = Arc::new(Zeroizing::new("pw".to_string()));
    let cache = HostKeyedStoreCache::new(dir.path(), password, 1).unwrap();

    let chain = self_signed_chain("a.test");
    let first = cache.get_or_create("a.test").unwrap();
    first.memorize(&chain).unwrap();
    drop(first);

    cache.get_or_create("b.test").unwrap();
    let reopened = cache.get_or_create("a.test").unwrap();

    assert_eq!(reopened.state().unwrap(), StoreState::Learned);
    assert!(reopened.check_server_trusted(&chain, "RSA", false).is_ok());
}
