//! R3L command line.
//!
//! Usage:
//!     r3l attest photo.jpg --mime image/jpeg
//!     r3l attest --text "statement to timestamp" --private
//!     r3l attest --url https://example.com/story
//!     r3l query <content-hash>
//!     r3l similar photo.jpg --mime image/jpeg
//!     r3l list --onchain

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use r3l_core::address::attestation_address;
use r3l_core::{Caller, ChallengeStore, ContentId, IdentityProof, Visibility};
use r3l_node::versioning::{trust_bundle_hash, VERIFIER_VERSION};
use r3l_node::{Access, AttestOptions, Node, Settings};
use serde::Serialize;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "r3l")]
#[command(about = "Content attestation on a public ledger")]
#[command(version)]
struct Args {
    #[command(flatten)]
    settings: Settings,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify and attest a file, a web page or a piece of text
    Attest {
        /// File to attest
        #[arg(required_unless_present_any = ["text", "url"], conflicts_with_all = ["text", "url"])]
        file: Option<PathBuf>,

        /// Fetch and attest this page instead of a file
        #[arg(long, conflicts_with = "text")]
        url: Option<String>,

        /// Attest this text instead of a file
        #[arg(long)]
        text: Option<String>,

        /// MIME type of the file
        #[arg(long)]
        mime: Option<String>,

        /// Record in the local store only, never on the ledger
        #[arg(long)]
        private: bool,

        /// Treat the file as unsigned without running the verifier
        #[arg(long)]
        skip_verifier: bool,

        /// Submitting account's email, for ledger attribution
        #[arg(long)]
        email: Option<String>,

        /// Keep the submitter's identity off the ledger
        #[arg(long)]
        privacy_mode: bool,

        /// Wallet public key (base58)
        #[arg(long, requires_all = ["wallet_message", "wallet_signature"])]
        wallet_pubkey: Option<String>,

        /// Signed message; must contain the content hash
        #[arg(long)]
        wallet_message: Option<String>,

        /// Detached signature over the message (base58)
        #[arg(long)]
        wallet_signature: Option<String>,
    },

    /// Trust verdict for one or more content hashes
    Query {
        #[arg(required = true, num_args = 1..)]
        hashes: Vec<String>,
    },

    /// Rank attested content by similarity to a file or an attested hash
    Similar {
        #[arg(required_unless_present = "hash", conflicts_with = "hash")]
        file: Option<PathBuf>,

        #[arg(long)]
        hash: Option<String>,

        #[arg(long)]
        mime: Option<String>,
    },

    /// List attestations, newest first
    List {
        #[arg(long, default_value_t = 50)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Include private records
        #[arg(long)]
        all: bool,

        /// Enumerate ledger accounts instead of the local store
        #[arg(long)]
        onchain: bool,
    },

    /// Issue a wallet login challenge
    Challenge,

    /// Hash of the current trust bundle
    TrustHash,

    /// Ledger address of a content hash
    Address { hash: String },
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    r3l_node::tracing::init_with_filter(&args.log_level);
    let settings = args.settings;

    match args.command {
        Command::Attest {
            file,
            url,
            text,
            mime,
            private,
            skip_verifier,
            email,
            privacy_mode,
            wallet_pubkey,
            wallet_message,
            wallet_signature,
        } => {
            let identity_proof = match (wallet_pubkey, wallet_message, wallet_signature) {
                (Some(key), Some(message), Some(signature)) => {
                    Some(IdentityProof::from_base58(&key, &message, &signature)?)
                }
                _ => None,
            };
            let caller = (email.is_some() || privacy_mode).then(|| Caller::Individual {
                account_id: 0,
                email,
                wallet: identity_proof.as_ref().map(|p| p.pubkey),
                privacy_mode,
            });
            let options = AttestOptions {
                caller,
                identity_proof,
                private,
                skip_verifier,
            };

            let node = Node::open(settings, Access::Submit)?;
            let report = match (file, url, text) {
                (Some(path), _, _) => {
                    let bytes = tokio::fs::read(&path).await?;
                    let filename = path.file_name().map(|n| n.to_string_lossy().into_owned());
                    node.attest_file(&bytes, filename.as_deref(), mime.as_deref(), options)
                        .await?
                }
                (None, Some(url), _) => node.attest_url(&url, options).await?,
                (None, None, Some(text)) => node.attest_text(&text, options).await?,
                (None, None, None) => return Err("nothing to attest".into()),
            };
            print_json(&report)?;
        }

        Command::Query { hashes } => {
            let node = Node::open(settings, Access::ReadOnly)?;
            if let [hash] = hashes.as_slice() {
                print_json(&node.query().query_hex(hash).await?)?;
            } else {
                print_json(&node.query().query_batch(&hashes).await?)?;
            }
        }

        Command::Similar { file, hash, mime } => {
            let node = Node::open(settings, Access::ReadOnly)?;
            let matches = match (file, hash) {
                (_, Some(hash)) => node.similarity().find_by_hash(hash.parse()?).await?,
                (Some(path), None) => {
                    let bytes = tokio::fs::read(&path).await?;
                    node.similarity().find_similar(&bytes, mime.as_deref()).await?
                }
                (None, None) => return Err("give a file or --hash".into()),
            };
            print_json(&matches)?;
        }

        Command::List {
            limit,
            offset,
            all,
            onchain,
        } => {
            let node = Node::open(settings, Access::ReadOnly)?;
            if onchain {
                print_json(&node.query().list_onchain(offset, limit).await?)?;
            } else {
                let visibility = if all { Visibility::All } else { Visibility::Public };
                print_json(&node.query().list(visibility, limit, offset).await?)?;
            }
        }

        Command::Challenge => {
            let store = r3l_core::challenge::init(ChallengeStore::in_memory());
            let challenge = store.issue();
            print_json(&serde_json::json!({
                "nonce": challenge.nonce,
                "message": challenge.message,
                "expires_in": challenge.expires_in.as_secs(),
            }))?;
            r3l_core::challenge::teardown();
        }

        Command::TrustHash => {
            let hash = trust_bundle_hash(&settings.trust_dir)?;
            info!(trust_dir = %settings.trust_dir.display(), "computed trust bundle hash");
            print_json(&serde_json::json!({
                "verifier_version": VERIFIER_VERSION,
                "trust_bundle_hash": hash,
            }))?;
        }

        Command::Address { hash } => {
            let content_id: ContentId = hash.parse()?;
            let (address, bump) = attestation_address(&content_id, &settings.program_id()?)?;
            print_json(&serde_json::json!({
                "content_hash": content_id,
                "attestation_pda": address,
                "bump": bump,
            }))?;
        }
    }

    Ok(())
}
