use std::collections::HashSet;
use std::hint::black_box;
use std::sync::Arc;
use std::time::Instant;

use proptest::prelude::*;
use rsintegrity::{
    compare_digests, ChallengeMethod, Client, ClientConfig, ClientConfigBuilder, KeyedHasher,
    RemoteStore, ResponderMode,
};

fn client_with(config: ClientConfig) -> (Client<RemoteStore>, Arc<RemoteStore>) {
    let hasher = KeyedHasher::new(config.algorithm, &config.key).expect("hasher");
    let remote = Arc::new(RemoteStore::in_memory(hasher));
    let client = Client::new(config, remote.clone()).expect("client");
    (client, remote)
}

fn client(
    precompute_count: usize,
    rotation_size: usize,
) -> (Client<RemoteStore>, Arc<RemoteStore>) {
    client_with(
        ClientConfigBuilder::default()
            .precompute_count(precompute_count)
            .rotation_size(rotation_size)
            .build_validated()
            .expect("config"),
    )
}

#[test]
fn hello_world_scenario() {
    let (client, _) = client(2, 5);
    let record = client.onboard_bytes("hello.txt", b"hello world").unwrap();
    assert_eq!(record.precomputed.len(), 2);
    assert!(record.precomputed.iter().all(|e| !e.used));

    let v1 = client.verify("hello.txt").unwrap();
    assert!(v1.matched);
    assert_eq!(v1.method, ChallengeMethod::Precomputed);
    assert_eq!(client.remaining_precomputed("hello.txt").unwrap(), 1);

    let v2 = client.verify("hello.txt").unwrap();
    assert!(v2.matched);
    assert_eq!(v2.method, ChallengeMethod::Precomputed);
    assert_eq!(client.remaining_precomputed("hello.txt").unwrap(), 0);

    let v3 = client.verify("hello.txt").unwrap();
    assert!(v3.matched);
    assert_eq!(v3.method, ChallengeMethod::Rotation);
}

#[test]
fn honest_round_trip_for_varied_content() {
    let (client, _) = client(1, 5);
    let big = vec![0x5a; 1 << 16];
    let inputs: [(&str, &[u8]); 3] = [("empty", b""), ("short", b"x"), ("big", &big)];
    for (id, content) in inputs {
        client.onboard_bytes(id, content).unwrap();
        assert!(client.is_intact(id).unwrap(), "{id} should verify");
    }
}

#[test]
fn tampering_detected_by_honest_store() {
    let (client, remote) = client(3, 5);
    client
        .onboard_bytes("tampered_file.txt", b"This file will be tampered with")
        .unwrap();
    remote
        .tamper("tampered_file.txt", b"TAMPERED CONTENT ADDED")
        .unwrap();
    assert!(!client.is_intact("tampered_file.txt").unwrap());
}

#[test]
fn fallback_only_after_pool_is_spent() {
    let n = 4;
    let (client, _) = client(n, 5);
    client.onboard_bytes("f", b"payload").unwrap();
    for i in 0..n {
        let v = client.verify("f").unwrap();
        assert_eq!(v.method, ChallengeMethod::Precomputed, "round {i}");
        assert_eq!(client.records().used_nonces("f").unwrap().len(), i + 1);
    }
    let v = client.verify("f").unwrap();
    assert_eq!(v.method, ChallengeMethod::Rotation);
    assert_eq!(client.records().used_nonces("f").unwrap().len(), n);
}

#[test]
fn replay_defeats_rotation_fallback() {
    // A single rotation nonce repeats on every fallback challenge.
    let (client, remote) = client(1, 1);
    client
        .onboard_bytes("replay_attack.txt", b"This file will demonstrate a replay attack")
        .unwrap();

    // Spend the precomputed entry, then get one honest rotation answer cached.
    assert!(client.is_intact("replay_attack.txt").unwrap());
    let cached = client.verify("replay_attack.txt").unwrap();
    assert_eq!(cached.method, ChallengeMethod::Rotation);
    assert!(cached.matched);

    remote
        .tamper("replay_attack.txt", b"\nTAMPERED CONTENT FOR REPLAY ATTACK")
        .unwrap();
    remote.set_mode(ResponderMode::Replay);

    let replayed = client.verify("replay_attack.txt").unwrap();
    assert_eq!(replayed.method, ChallengeMethod::Rotation);
    assert!(replayed.matched, "stale answer passes the rotation path");

    // An honest store exposes the same tampering.
    remote.set_mode(ResponderMode::Honest);
    assert!(!client.is_intact("replay_attack.txt").unwrap());
}

#[test]
fn replay_fails_against_precomputed_nonces() {
    let (client, remote) = client(3, 5);
    client.onboard_bytes("p", b"original").unwrap();
    assert!(client.is_intact("p").unwrap());

    remote.tamper("p", b"!").unwrap();
    remote.set_mode(ResponderMode::Replay);
    for _ in 0..2 {
        let v = client.verify("p").unwrap();
        assert_eq!(v.method, ChallengeMethod::Precomputed);
        assert!(!v.matched);
    }
}

#[test]
fn persisted_document_has_expected_fields() {
    let tmp = tempfile::tempdir().unwrap();
    let (client, _) = client_with(
        ClientConfigBuilder::default()
            .precompute_count(3)
            .storage_dir(tmp.path())
            .build_validated()
            .unwrap(),
    );
    client.onboard_bytes("doc.txt", b"document").unwrap();
    client.verify("doc.txt").unwrap();

    let raw = std::fs::read(tmp.path().join("metadata.json")).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    let entry = &json["doc.txt"];
    assert_eq!(entry["local_reference"], "doc.txt");
    assert_eq!(entry["onboarding_nonce"].as_str().unwrap().len(), 32);
    assert_eq!(entry["onboarding_digest"].as_str().unwrap().len(), 64);
    assert_eq!(entry["precomputed"].as_object().unwrap().len(), 3);
    let used = entry["used_hashes"].as_array().unwrap();
    assert_eq!(used.len(), 1);
    assert!(entry["precomputed"]
        .as_object()
        .unwrap()
        .contains_key(used[0].as_str().unwrap()));
}

fn median(mut samples: Vec<u128>) -> u128 {
    samples.sort_unstable();
    samples[samples.len() / 2]
}

#[test]
fn comparator_timing_is_position_independent() {
    let base = [0x42u8; 32];
    let mut early = base;
    early[0] ^= 0xff;
    let mut late = base;
    late[31] ^= 0xff;

    const ITERS: usize = 20_000;
    const SAMPLES: usize = 41;
    let mut early_ns = Vec::with_capacity(SAMPLES);
    let mut late_ns = Vec::with_capacity(SAMPLES);

    for _ in 0..SAMPLES {
        let start = Instant::now();
        for _ in 0..ITERS {
            black_box(compare_digests(black_box(&base), black_box(&early)));
        }
        early_ns.push(start.elapsed().as_nanos());

        let start = Instant::now();
        for _ in 0..ITERS {
            black_box(compare_digests(black_box(&base), black_box(&late)));
        }
        late_ns.push(start.elapsed().as_nanos());
    }

    let early = median(early_ns).max(1) as f64;
    let late = median(late_ns).max(1) as f64;
    let ratio = early / late;
    assert!(
        (1.0 / 3.0..=3.0).contains(&ratio),
        "median timing ratio {ratio:.3} suggests early exit"
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn consumed_precomputed_nonces_never_repeat(count in 1usize..24, extra in 0usize..4) {
        let (client, _) = client(count, 3);
        let record = client.onboard_bytes("prop", b"property content").unwrap();

        let mut consumed = Vec::new();
        for _ in 0..(count + extra) {
            let v = client.verify("prop").unwrap();
            prop_assert!(v.matched);
            if v.method == ChallengeMethod::Precomputed {
                consumed.push(v.nonce);
            }
        }
        let unique: HashSet<_> = consumed.iter().copied().collect();
        prop_assert_eq!(consumed.len(), count);
        prop_assert_eq!(unique.len(), count);
        let pool: Vec<_> = record.precomputed.iter().map(|e| e.nonce).collect();
        prop_assert_eq!(consumed, pool);
    }
}
