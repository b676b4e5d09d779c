use std::error::Error;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use nfc_guard::config::{signing_secret_from_env, SecurityConfig, ENV_SECRET};
use nfc_guard::crypto::signature::{SignatureService, SigningSecret};
use nfc_guard::crypto::utils::{generate_random_bytes, hex_to_bytes};
use nfc_guard::crypto::{DeviceInfo, FingerprintService};
use nfc_guard::hardware::{SimulatedTag, SimulatedTransceiver};
use nfc_guard::ndef::{self, NdefRecord, DEFAULT_LANGUAGE};
use nfc_guard::reader::{AccessReport, TagAccessOrchestrator};
use nfc_guard::store::{KeychainStore, KeyValueStore, MemoryStore, SecurityLog};

#[derive(Parser, Debug)]
#[command(name = "nfc-guard", version, about = "NFC tag security toolkit")]
struct Cli {
    /// Signing secret (falls back to NFC_GUARD_SECRET)
    #[arg(long, global = true)]
    secret: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode text and URI records as an NDEF message (hex)
    Encode {
        #[arg(long)]
        text: Vec<String>,
        #[arg(long)]
        uri: Vec<String>,
        #[arg(long, default_value = DEFAULT_LANGUAGE)]
        lang: String,
    },
    /// Decode an NDEF message given as hex
    Decode { hex: String },
    /// Produce a signed payload for `data`
    Sign { data: String },
    /// Verify a signed payload
    Verify { payload: String },
    /// Print this device's fingerprint for today
    Fingerprint,
    /// Write a signed payload to a simulated tag and read it back repeatedly
    Simulate {
        #[arg(long, default_value = "demo-access")]
        data: String,
        #[arg(long, default_value_t = 5)]
        reads: usize,
        /// Locations to cycle through, one per read
        #[arg(long)]
        location: Vec<String>,
        /// Persist logs and patterns in the OS keychain
        #[arg(long)]
        keychain: bool,
    },
    /// Show or clear the security logs kept in the OS keychain
    Logs {
        #[arg(long)]
        clear: bool,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    env_logger::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        log::error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let secret = cli
        .secret
        .filter(|s| !s.is_empty())
        .map(SigningSecret::new)
        .or_else(signing_secret_from_env);

    match cli.command {
        Command::Encode { text, uri, lang } => {
            let mut records = Vec::with_capacity(text.len() + uri.len());
            for t in &text {
                records.push(NdefRecord::text(t, &lang)?);
            }
            records.extend(uri.iter().map(|u| NdefRecord::uri(u)));
            if records.is_empty() {
                return Err("nothing to encode: pass --text or --uri".into());
            }
            println!("{}", hex::encode(ndef::encode(&records)?));
        }
        Command::Decode { hex } => {
            let records = ndef::decode(&hex_to_bytes(&hex)?);
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Sign { data } => {
            let secret = require_secret(secret)?;
            let config = SecurityConfig::from_env()?;
            let service = SignatureService::new(config.expiry_window, config.payload_capacity);
            let device = FingerprintService::new(DeviceInfo::detect()).fingerprint();
            let payload = service.sign(&data, &secret, &device)?;
            let wire = payload.to_wire();
            let bytes = ndef::encode(&[NdefRecord::text(&wire, DEFAULT_LANGUAGE)?])?;
            println!("{}", wire);
            println!("NDEF ({} bytes): {}", bytes.len(), hex::encode(bytes));
        }
        Command::Verify { payload } => {
            let secret = require_secret(secret)?;
            let config = SecurityConfig::from_env()?;
            let service = SignatureService::new(config.expiry_window, config.payload_capacity);
            let verification = service.verify(&payload, &secret);
            println!("valid:   {}", verification.is_valid);
            println!("expired: {}", verification.is_expired);
            if let Some(age) = verification.age_ms {
                println!("age:     {}s", age / 1000);
            }
            if let Some(signed) = &verification.payload {
                println!("data:    {}", signed.data);
            }
            for event in &verification.events {
                println!("  {}", event);
            }
        }
        Command::Fingerprint => {
            println!("{}", FingerprintService::new(DeviceInfo::detect()).fingerprint());
        }
        Command::Simulate {
            data,
            reads,
            location,
            keychain,
        } => {
            let secret = secret.unwrap_or_else(|| {
                log::info!("{} not set, using a random secret for this run", ENV_SECRET);
                SigningSecret::new(generate_random_bytes(32))
            });
            simulate(&data, reads, &location, keychain, secret).await?;
        }
        Command::Logs { clear } => {
            let log = SecurityLog::new(Arc::new(KeychainStore::default()));
            if clear {
                log.clear()?;
                println!("Security logs cleared");
            } else {
                println!("{}", serde_json::to_string_pretty(&log.stats()?)?);
                for report in log.threat_reports()?.iter().take(10) {
                    println!("  {} {:?} {}", report.timestamp, report.severity, report.description);
                }
            }
        }
    }

    Ok(())
}

fn require_secret(secret: Option<SigningSecret>) -> Result<SigningSecret, Box<dyn Error>> {
    secret.ok_or_else(|| format!("no signing secret: pass --secret or set {}", ENV_SECRET).into())
}

async fn simulate(
    data: &str,
    reads: usize,
    locations: &[String],
    keychain: bool,
    secret: SigningSecret,
) -> Result<(), Box<dyn Error>> {
    let config = SecurityConfig::from_env()?;
    let store: Arc<dyn KeyValueStore> = if keychain {
        Arc::new(KeychainStore::default())
    } else {
        Arc::new(MemoryStore::new())
    };

    let tag = SimulatedTag::ntag215(generate_random_bytes(7), Vec::new());
    let reader = SimulatedTransceiver::new().with_tag(tag);
    let orchestrator = TagAccessOrchestrator::new(reader, store, secret, config);

    let written = orchestrator.write_signed(data).await?;
    println!(
        "Wrote {} bytes to tag {}: {}",
        written.bytes_written,
        written.tag_id,
        written.payload.to_wire()
    );

    for i in 0..reads {
        let location = if locations.is_empty() {
            None
        } else {
            Some(locations[i % locations.len()].as_str())
        };
        let report = orchestrator.read_tag(location).await?;
        print_report(i + 1, &report);
    }

    let stats = orchestrator.security_log().stats()?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn print_report(n: usize, report: &AccessReport) {
    println!(
        "Read {}: tag {} {} ({:?}, {}ms)",
        n,
        report.tag.id_hex(),
        if report.access_granted { "granted" } else { "DENIED" },
        report.security_level,
        report.duration_ms
    );
    for event in &report.events {
        println!("  {}", event);
    }
    for denial in &report.denials {
        println!("  denied: {}", denial);
    }
}
