//! End-to-end pipeline tests, stepped deterministically.
//!
//! These drive the real state machines through the real relay store, one
//! explicit cycle at a time, and check the protocol-level properties: the
//! concrete envelope lengths at every hop, constant batch size, FIFO
//! draining, silent dummy rejection, and the no-delete-before-post rule.

use covermix_core::{
    Agent, ContactAgent, CycleStats, MixBatcher, MixConfig, RelayClient, SourceAgent,
};
use covermix_crypto::MixerKeySet;
use covermix_harness::{FlakyRelay, KeyFixture, key_fixture, store_fixture};
use covermix_proto::Direction;
use covermix_relay::InProcessRelay;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

fn source_agent(fx: &KeyFixture) -> SourceAgent {
    SourceAgent::new(
        fx.source.clone(),
        fx.contact.public().clone(),
        fx.mixer.encryption.public().clone(),
        fx.mixer.signing.verify_key().clone(),
    )
}

fn contact_agent(fx: &KeyFixture) -> ContactAgent {
    ContactAgent::new(
        fx.contact.clone(),
        fx.mixer.encryption.public().clone(),
        fx.mixer.signing.verify_key().clone(),
    )
}

/// One mixer cycle against the relay: confirm parked deletes, collect,
/// batch, post, then delete the consumed inputs.
async fn mix_cycle(
    batcher: &mut MixBatcher,
    relay: &impl RelayClient,
    keys: &MixerKeySet,
    rng: &mut ChaCha20Rng,
) -> Option<CycleStats> {
    let direction = batcher.direction();

    for id in batcher.unconfirmed_deletes() {
        relay.delete(direction, id).await.expect("retry delete");
        batcher.confirm_delete(id);
    }

    let arrivals = relay.fetch_oldest(direction, batcher.fetch_count()).await.expect("fetch");
    batcher.absorb(arrivals);

    let plan = batcher.plan(keys, rng).expect("plan")?;
    relay.post_batch(direction, plan.outputs.clone()).await.expect("post");

    for id in batcher.commit() {
        relay.delete(direction, id).await.expect("delete");
        batcher.confirm_delete(id);
    }

    Some(plan.stats)
}

#[tokio::test]
async fn full_conversation_roundtrip() {
    let fx = key_fixture(1);
    let store = store_fixture(&fx);
    let tokens = store.tokens().clone();
    let mut rng = ChaCha20Rng::seed_from_u64(77);

    let source_relay = InProcessRelay::new(store.clone(), tokens.source.clone());
    let contact_relay = InProcessRelay::new(store.clone(), tokens.contact.clone());
    let mixer_relay = InProcessRelay::new(store.clone(), tokens.mixer.clone());

    // Source cycle: "Hello World!" plus the mandatory dummy.
    let mut source = source_agent(&fx);
    source.queue(b"Hello World!".to_vec()).expect("queue");
    let outbound = source.compose(&mut rng).expect("compose");
    assert_eq!(outbound.len(), 2);
    for envelope in &outbound {
        assert_eq!(envelope.len(), 385);
    }
    for envelope in outbound {
        source_relay.enqueue(Direction::SourceToContact, envelope).await.expect("enqueue");
    }

    // Mixer cycle: 1 real + 1 dummy in, exactly 4 signed drops out.
    let mut batcher =
        MixBatcher::new(Direction::SourceToContact, MixConfig::default()).expect("batcher");
    let stats = mix_cycle(&mut batcher, &mixer_relay, &fx.mixer, &mut rng).await.expect("emit");
    assert_eq!(stats.drained, 2);
    assert_eq!(stats.real, 1);
    assert_eq!(stats.dummies, 1);
    assert_eq!(stats.fillers, 3);
    assert_eq!(store.pending_len(Direction::SourceToContact), 0);

    // Contact cycle: four 400-byte drops, exactly one opens, three drop
    // silently.
    let drops = contact_relay.fetch_deaddrop(Direction::SourceToContact).await.expect("poll");
    assert_eq!(drops.len(), 4);
    for drop in &drops {
        assert_eq!(drop.len(), 400);
    }

    let mut contact = contact_agent(&fx);
    let report = contact.receive(&drops);
    assert_eq!(report.fetched, 4);
    assert_eq!(report.decoded, 1);
    assert_eq!(report.fresh.len(), 1);
    assert_eq!(report.fresh[0].body, b"Hello World!");
    let sender = report.fresh[0].sender.clone().expect("source key travels with the tip");
    assert_eq!(&sender, fx.source.public());

    // Reply leg: contact -> mixer -> source.
    contact.queue((sender, b"Wassup?".to_vec())).expect("queue reply");
    let outbound = contact.compose(&mut rng).expect("compose");
    assert_eq!(outbound.len(), 2);
    for envelope in &outbound {
        assert_eq!(envelope.len(), 345);
    }
    for envelope in outbound {
        contact_relay.enqueue(Direction::ContactToSource, envelope).await.expect("enqueue");
    }

    let mut reply_batcher =
        MixBatcher::new(Direction::ContactToSource, MixConfig::default()).expect("batcher");
    let stats =
        mix_cycle(&mut reply_batcher, &mixer_relay, &fx.mixer, &mut rng).await.expect("emit");
    assert_eq!(stats.real, 1);
    assert_eq!(stats.fillers, 3);

    let mut source_drops =
        source_relay.fetch_deaddrop(Direction::ContactToSource).await.expect("poll");
    assert_eq!(source_drops.len(), 4);
    for drop in &source_drops {
        assert_eq!(drop.len(), 360);
    }

    let report = source.receive(&source_drops);
    assert_eq!(report.decoded, 1);
    assert_eq!(report.fresh.len(), 1);
    assert_eq!(report.fresh[0].body, b"Wassup?");
    assert_eq!(report.fresh[0].sender, None);

    // Polling the broadcast deaddrop again surfaces nothing new.
    source_drops = source_relay.fetch_deaddrop(Direction::ContactToSource).await.expect("poll");
    let report = source.receive(&source_drops);
    assert!(report.fresh.is_empty());
}

#[tokio::test]
async fn light_load_waits_for_threshold() {
    let fx = key_fixture(2);
    let store = store_fixture(&fx);
    let tokens = store.tokens().clone();
    let mut rng = ChaCha20Rng::seed_from_u64(5);

    let source_relay = InProcessRelay::new(store.clone(), tokens.source.clone());
    let mixer_relay = InProcessRelay::new(store.clone(), tokens.mixer.clone());

    let mut source = source_agent(&fx);
    source.queue(b"lonely".to_vec()).expect("queue");
    // Only the real envelope this time: stay under the threshold.
    let outbound = source.compose(&mut rng).expect("compose");
    source_relay
        .enqueue(Direction::SourceToContact, outbound[0].clone())
        .await
        .expect("enqueue");

    let mut batcher =
        MixBatcher::new(Direction::SourceToContact, MixConfig::default()).expect("batcher");
    let emitted = mix_cycle(&mut batcher, &mixer_relay, &fx.mixer, &mut rng).await;
    assert!(emitted.is_none(), "one envelope must not trigger a batch");
    assert_eq!(batcher.buffered(), 1);
    assert_eq!(store.pending_len(Direction::SourceToContact), 1);
    assert_eq!(store.deaddrop_len(Direction::SourceToContact), 0);
}

#[tokio::test]
async fn fifo_pairs_drain_oldest_first_through_the_relay() {
    let fx = key_fixture(3);
    let store = store_fixture(&fx);
    let tokens = store.tokens().clone();
    let mut rng = ChaCha20Rng::seed_from_u64(11);

    let source_relay = InProcessRelay::new(store.clone(), tokens.source.clone());
    let mixer_relay = InProcessRelay::new(store.clone(), tokens.mixer.clone());
    let contact_relay = InProcessRelay::new(store, tokens.contact.clone());

    let mut source = source_agent(&fx);
    for body in [&b"A"[..], b"B", b"C", b"D"] {
        source.queue(body.to_vec()).expect("queue");
        let outbound = source.compose(&mut rng).expect("compose");
        // Reals only, so arrival order is exactly A, B, C, D.
        source_relay
            .enqueue(Direction::SourceToContact, outbound[0].clone())
            .await
            .expect("enqueue");
    }

    let mut batcher =
        MixBatcher::new(Direction::SourceToContact, MixConfig::default()).expect("batcher");
    let mut contact = contact_agent(&fx);

    // First cycle drains exactly {A, B}, oldest first.
    let stats = mix_cycle(&mut batcher, &mixer_relay, &fx.mixer, &mut rng).await.expect("emit");
    assert_eq!(stats.real, 2);
    let drops = contact_relay.fetch_deaddrop(Direction::SourceToContact).await.expect("poll");
    let bodies: Vec<Vec<u8>> =
        contact.receive(&drops).fresh.into_iter().map(|m| m.body).collect();
    assert_eq!(bodies, vec![b"A".to_vec(), b"B".to_vec()]);

    // Second cycle drains {C, D}. The broadcast deaddrop still carries the
    // first batch; the dedup window screens it out.
    let stats = mix_cycle(&mut batcher, &mixer_relay, &fx.mixer, &mut rng).await.expect("emit");
    assert_eq!(stats.real, 2);
    let drops = contact_relay.fetch_deaddrop(Direction::SourceToContact).await.expect("poll");
    assert_eq!(drops.len(), 8);
    let bodies: Vec<Vec<u8>> =
        contact.receive(&drops).fresh.into_iter().map(|m| m.body).collect();
    assert_eq!(bodies, vec![b"C".to_vec(), b"D".to_vec()]);
}

#[tokio::test]
async fn post_failure_aborts_cycle_without_corrupting_state() {
    let fx = key_fixture(4);
    let store = store_fixture(&fx);
    let tokens = store.tokens().clone();
    let mut rng = ChaCha20Rng::seed_from_u64(21);

    let source_relay = InProcessRelay::new(store.clone(), tokens.source.clone());
    let flaky_mixer =
        FlakyRelay::new(InProcessRelay::new(store.clone(), tokens.mixer.clone()), 1, 0);

    let mut source = source_agent(&fx);
    source.queue(b"persistent".to_vec()).expect("queue");
    for envelope in source.compose(&mut rng).expect("compose") {
        source_relay.enqueue(Direction::SourceToContact, envelope).await.expect("enqueue");
    }

    let mut batcher =
        MixBatcher::new(Direction::SourceToContact, MixConfig::default()).expect("batcher");

    // First attempt: the post fails after planning; nothing may move.
    let arrivals = flaky_mixer
        .fetch_oldest(Direction::SourceToContact, batcher.fetch_count())
        .await
        .expect("fetch");
    batcher.absorb(arrivals);
    let plan = batcher.plan(&fx.mixer, &mut rng).expect("plan").expect("threshold reached");
    let posted = flaky_mixer.post_batch(Direction::SourceToContact, plan.outputs.clone()).await;
    assert!(posted.is_err());
    assert_eq!(batcher.buffered(), 2);
    assert_eq!(store.pending_len(Direction::SourceToContact), 2);
    assert_eq!(store.deaddrop_len(Direction::SourceToContact), 0);

    // Next cycle retries clean and succeeds.
    let stats = mix_cycle(&mut batcher, &flaky_mixer, &fx.mixer, &mut rng).await.expect("emit");
    assert_eq!(stats.real, 1);
    assert_eq!(store.pending_len(Direction::SourceToContact), 0);
    assert_eq!(store.deaddrop_len(Direction::SourceToContact), 4);

    // Exactly one payload is recoverable.
    let contact_relay = InProcessRelay::new(store, tokens.contact);
    let drops = contact_relay.fetch_deaddrop(Direction::SourceToContact).await.expect("poll");
    let mut contact = contact_agent(&fx);
    let report = contact.receive(&drops);
    assert_eq!(report.fresh.len(), 1);
    assert_eq!(report.fresh[0].body, b"persistent");
}
