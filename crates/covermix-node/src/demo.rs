//! Single-process demo pipeline.
//!
//! Wires the full system together the way separate deployments would: a
//! shared relay store, the mixer loop, and both agent loops, each holding
//! only its own role's token and key material. The source sends the
//! configured messages, the contact logs fresh arrivals and replies to each
//! sender, and everything keeps emitting cover traffic until interrupted.

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use covermix_core::{
    AgentDriver, ContactAgent, Environment, MixConfig, MixerDriver, RelayClient, SourceAgent,
};
use covermix_crypto::{
    Classified, EncryptionKeyPair, EncryptionPublicKey, MixerKeySet, VerifyKey, classify_envelope,
    dummy_lane_payload, seal_source_message, sign_drop, verify_drop,
};
use covermix_proto::{Direction, PublishedKeys};
use covermix_relay::{AccessTokens, InProcessRelay, MemoryDropStore, StoreConfig};
use rand::{CryptoRng, RngCore};
use tokio::sync::{mpsc, watch};

use crate::{error::NodeError, keyfiles::KeyDir, system_env::SystemEnv};

/// Demo run parameters.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// Cycle period for all three loops.
    pub period: Duration,
    /// Mixer thresholds.
    pub mix: MixConfig,
    /// Messages the source sends, one per cycle.
    pub messages: Vec<String>,
    /// Stop automatically after this long (ctrl-c always works).
    pub run_for: Option<Duration>,
    /// Load keys from this directory instead of generating fresh ones.
    pub key_dir: Option<PathBuf>,
}

struct DemoKeys {
    mixer: MixerKeySet,
    source: EncryptionKeyPair,
    contact: EncryptionKeyPair,
}

fn build_keys(env: &SystemEnv, key_dir: Option<&PathBuf>) -> Result<DemoKeys, NodeError> {
    match key_dir {
        Some(dir) => {
            let keys = KeyDir::new(dir);
            tracing::info!(dir = %keys.root().display(), "loading keys from directory");
            Ok(DemoKeys {
                mixer: keys.load_mixer()?,
                source: keys.load_source()?,
                contact: keys.load_contact(1)?,
            })
        },
        None => {
            let mut rng = env.rng();
            Ok(DemoKeys {
                mixer: MixerKeySet::generate(&mut rng),
                source: EncryptionKeyPair::generate(&mut rng),
                contact: EncryptionKeyPair::generate(&mut rng),
            })
        },
    }
}

/// Check that the published key material matches the local private halves
/// before any traffic moves: one seal/classify round and one sign/verify
/// round against the *published* keys.
fn self_check(
    keys: &MixerKeySet,
    published: &PublishedKeys,
    rng: &mut (impl RngCore + CryptoRng),
) -> Result<(), NodeError> {
    let mixer_pub = EncryptionPublicKey::from_hex(&published.mixer_key)?;
    let mixer_verify = VerifyKey::from_hex(&published.mixer_sign_key)?;

    let throwaway = EncryptionKeyPair::generate(rng);
    let probe = seal_source_message(
        rng,
        throwaway.public(),
        &mixer_pub,
        throwaway.public(),
        b"startup probe",
        true,
    )?;
    match classify_envelope(&keys.encryption, Direction::SourceToContact, &probe) {
        Classified::Forward(_) => {},
        other => {
            return Err(NodeError::SelfCheck(format!(
                "published encryption key does not match private key: {other:?}"
            )));
        },
    }

    let payload = dummy_lane_payload(rng, Direction::SourceToContact)?;
    let signed = sign_drop(&keys.signing, Direction::SourceToContact, &payload)?;
    verify_drop(&mixer_verify, Direction::SourceToContact, &signed).map_err(|reason| {
        NodeError::SelfCheck(format!("published verify key rejects own signature: {reason}"))
    })?;

    tracing::info!("published keys match local private material");
    Ok(())
}

/// Run the full pipeline in one process until interrupted.
pub async fn run_demo(config: DemoConfig) -> Result<(), NodeError> {
    let env = SystemEnv::new();
    let keys = build_keys(&env, config.key_dir.as_ref())?;

    let published = PublishedKeys {
        mixer_key: keys.mixer.encryption.public().to_hex(),
        mixer_sign_key: keys.mixer.signing.verify_key().to_hex(),
        contact_keys: BTreeMap::from([(1, keys.contact.public().to_hex())]),
    };
    let store =
        MemoryDropStore::new(AccessTokens::default(), published, StoreConfig::default());
    let tokens = store.tokens().clone();

    // Each role reads the published material through the relay, exactly as
    // separate processes would; a failure here is fatal at startup.
    let mixer_relay = InProcessRelay::new(store.clone(), tokens.mixer.clone());
    let fetched = mixer_relay.published_keys().await?;
    self_check(&keys.mixer, &fetched, &mut env.rng())?;

    let mixer_pub = EncryptionPublicKey::from_hex(&fetched.mixer_key)?;
    let mixer_verify = VerifyKey::from_hex(&fetched.mixer_sign_key)?;
    let contact_pub = EncryptionPublicKey::from_hex(
        fetched
            .contact_key(1)
            .ok_or_else(|| NodeError::SelfCheck("contact key 1 is not published".to_string()))?,
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mixer_driver = MixerDriver::new(
        mixer_relay,
        env.clone(),
        keys.mixer,
        config.mix,
        config.period,
        shutdown_rx.clone(),
    )?;

    let source_agent =
        SourceAgent::new(keys.source, contact_pub, mixer_pub.clone(), mixer_verify.clone());
    let contact_agent = ContactAgent::new(keys.contact, mixer_pub, mixer_verify);

    let (source_inbox_tx, mut source_inbox) = mpsc::channel(64);
    let (source_cmd_tx, source_cmd) = mpsc::channel(64);
    let (contact_inbox_tx, mut contact_inbox) = mpsc::channel(64);
    let (contact_cmd_tx, contact_cmd) = mpsc::channel(64);

    let source_driver = AgentDriver::new(
        source_agent,
        InProcessRelay::new(store.clone(), tokens.source.clone()),
        env.clone(),
        config.period,
        shutdown_rx.clone(),
        source_inbox_tx,
        source_cmd,
    );
    let contact_driver = AgentDriver::new(
        contact_agent,
        InProcessRelay::new(store, tokens.contact.clone()),
        env.clone(),
        config.period,
        shutdown_rx,
        contact_inbox_tx,
        contact_cmd,
    );

    let mixer_task = tokio::spawn(mixer_driver.run());
    let source_task = tokio::spawn(source_driver.run());
    let contact_task = tokio::spawn(contact_driver.run());

    for message in &config.messages {
        if source_cmd_tx.send(message.clone().into_bytes()).await.is_err() {
            break;
        }
    }

    // Contact application: surface fresh tips, reply to each sender.
    let reply_task = tokio::spawn(async move {
        while let Some(message) = contact_inbox.recv().await {
            let text = String::from_utf8_lossy(&message.body).into_owned();
            tracing::info!(%text, "contact received");
            if let Some(sender) = message.sender {
                let mut reply = format!("Reply for: {text}").into_bytes();
                reply.truncate(255);
                if contact_cmd_tx.send((sender, reply)).await.is_err() {
                    break;
                }
            }
        }
    });

    // Source application: just surface replies.
    let source_log_task = tokio::spawn(async move {
        while let Some(message) = source_inbox.recv().await {
            tracing::info!(text = %String::from_utf8_lossy(&message.body), "source received");
        }
    });

    match config.run_for {
        Some(duration) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => tracing::info!("interrupt received"),
                () = tokio::time::sleep(duration) => tracing::info!("demo window elapsed"),
            }
        },
        None => {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("interrupt received");
        },
    }

    // Loops finish their in-flight cycle, then exit; the application tasks
    // drain once the drivers drop their inbox senders.
    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(mixer_task, source_task, contact_task);
    let _ = tokio::join!(reply_task, source_log_task);

    Ok(())
}
