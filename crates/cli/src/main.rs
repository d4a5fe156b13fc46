//! Command-line client for Rubrica.

mod api_client;

use anyhow::{Context, Result};
use api_client::{
    ApiClient, CreateTokenRequest, DemoSignRequest, DocumentResponse, HsmSignRequest,
    SignatureOutcomeResponse, SignatureResponse, TokenCompleteRequest, TokenPrepareRequest,
    TokenRejectRequest, VerificationResponse,
};
use clap::{Args, Parser, Subcommand};
use rubrica_core::{ContentHash, SignatureBlob, TokenScope};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "rubricactl")]
#[command(about = "Command-line client for the Rubrica signature service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ApiArgs {
    /// Server API URL
    #[arg(long, env = "RUBRICA_SERVER", global = true)]
    server: Option<String>,

    /// Bearer token
    #[arg(long, env = "RUBRICA_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Document registration and inspection
    Documents {
        #[command(subcommand)]
        command: DocumentCommands,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Sign a document in a single step (Demo or HSM)
    Sign {
        #[command(subcommand)]
        command: SignCommands,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Two-step Token signing
    Token {
        #[command(subcommand)]
        command: TokenFlowCommands,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Show a single signature record
    Signature {
        /// Signature ID
        signature_id: String,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// API token management
    Tokens {
        #[command(subcommand)]
        command: TokenCommands,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Show current token identity
    Whoami {
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Show server signing capabilities
    Capabilities {
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Check server health and version
    Health {
        #[command(flatten)]
        api: ApiArgs,
    },
}

#[derive(Subcommand)]
enum DocumentCommands {
    /// Register a document from a local file
    Register {
        /// File to upload
        file: PathBuf,
        /// Case (expediente) identifier
        #[arg(long = "case")]
        case_id: Option<String>,
        /// Document title
        #[arg(long)]
        title: Option<String>,
        /// MIME type (guessed from the extension when omitted)
        #[arg(long)]
        mime_type: Option<String>,
    },
    /// Show document details
    Show {
        /// Document ID
        document_id: String,
    },
    /// List documents of a case
    List {
        /// Case (expediente) identifier
        #[arg(long = "case")]
        case_id: String,
    },
    /// Show the signature history of a document
    Signatures {
        /// Document ID
        document_id: String,
    },
    /// Recompute the stored hash and check signatures against it
    Verify {
        /// Document ID
        document_id: String,
    },
}

#[derive(Subcommand)]
enum SignCommands {
    /// Demo signature (testing only)
    Demo {
        /// Document ID
        document_id: String,
        /// Free-text comment
        #[arg(short, long)]
        comment: Option<String>,
    },
    /// Server-side HSM signature
    Hsm {
        /// Document ID
        document_id: String,
        /// Free-text comment
        #[arg(short, long)]
        comment: Option<String>,
        /// Replace your existing HSM signature
        #[arg(long, default_value_t = false)]
        resign: bool,
    },
}

#[derive(Subcommand)]
enum TokenFlowCommands {
    /// Start a Token signature and print the hash to sign
    Prepare {
        /// Document ID
        document_id: String,
        /// Free-text comment
        #[arg(short, long)]
        comment: Option<String>,
    },
    /// Submit the signature produced by the hardware token
    Complete {
        /// Document ID
        document_id: String,
        /// Solicitud ID returned by `token prepare`
        #[arg(long)]
        solicitud: String,
        /// Base64 signature blob
        #[arg(long, group = "blob_source")]
        blob: Option<String>,
        /// File with the raw signature bytes
        #[arg(long, group = "blob_source")]
        blob_file: Option<PathBuf>,
        /// Certificate serial of the signing certificate
        #[arg(long)]
        certificate_serial: Option<String>,
        /// External reference (UUID or 32 hex chars)
        #[arg(long)]
        external_reference: Option<String>,
    },
    /// Cancel a pending Token signature
    Reject {
        /// Document ID
        document_id: String,
        /// Solicitud ID returned by `token prepare`
        #[arg(long)]
        solicitud: String,
        /// Reason for the rejection
        #[arg(short, long)]
        reason: Option<String>,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Generate a token offline (outputs secret + hash)
    Generate {
        /// Description for the token
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Create a new token
    Create {
        /// Signer identity the token authenticates as
        #[arg(long)]
        subject: String,
        /// Scopes to grant (comma-separated)
        #[arg(short, long)]
        scopes: String,
        /// Expiration in seconds
        #[arg(short, long)]
        expires_in: Option<u64>,
        /// Description
        #[arg(short, long)]
        description: Option<String>,
    },
    /// List tokens
    List,
    /// Revoke a token
    Revoke {
        /// Token ID to revoke
        token_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let Cli { command } = Cli::parse();

    match command {
        Commands::Documents { command, api } => handle_document_command(command, &api).await,
        Commands::Sign { command, api } => handle_sign_command(command, &api).await,
        Commands::Token { command, api } => handle_token_flow_command(command, &api).await,
        Commands::Signature { signature_id, api } => {
            let client = get_api_client(&api)?;
            let signature = client.get_signature(&signature_id).await?;
            print_signature(&signature);
            Ok(())
        }
        Commands::Tokens { command, api } => handle_token_command(command, &api).await,
        Commands::Whoami { api } => handle_whoami_command(&api).await,
        Commands::Capabilities { api } => handle_capabilities_command(&api).await,
        Commands::Health { api } => handle_health_command(&api).await,
    }
}

fn resolve_server(api: &ApiArgs) -> Result<String> {
    let server = api
        .server
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("missing server: use --server or RUBRICA_SERVER"))?;
    normalize_base_url(server)
}

fn get_api_client(api: &ApiArgs) -> Result<ApiClient> {
    let base_url = resolve_server(api)?;
    let token = api
        .token
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("missing token: use --token or RUBRICA_TOKEN"))?;
    ApiClient::new(&base_url, token)
}

async fn handle_document_command(command: DocumentCommands, api: &ApiArgs) -> Result<()> {
    let client = get_api_client(api)?;
    match command {
        DocumentCommands::Register {
            file,
            case_id,
            title,
            mime_type,
        } => {
            let mime_type = match mime_type {
                Some(m) => m,
                None => guess_mime_type(&file)?.to_string(),
            };
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let local_hash = ContentHash::compute(&bytes);
            tracing::debug!(file = %file.display(), hash = %local_hash, "Uploading document");

            let document = client
                .register_document(bytes, &mime_type, case_id.as_deref(), title.as_deref())
                .await?;
            if document.content_hash != local_hash.to_hex() {
                anyhow::bail!(
                    "server recorded hash {} but local file hashes to {}",
                    document.content_hash,
                    local_hash
                );
            }

            println!("Document registered successfully!");
            print_document(&document);
        }
        DocumentCommands::Show { document_id } => {
            let document = client.get_document(&document_id).await?;
            print_document(&document);
        }
        DocumentCommands::List { case_id } => {
            let documents = client.list_documents(&case_id).await?;
            if documents.is_empty() {
                println!("No documents found for case {case_id}.");
                return Ok(());
            }

            println!(
                "{:<38} {:<18} {:<12} {:<26} Title",
                "ID", "State", "Size", "Created"
            );
            println!("{}", "-".repeat(110));
            for doc in documents {
                println!(
                    "{:<38} {:<18} {:<12} {:<26} {}",
                    doc.id,
                    doc.state,
                    format_bytes(doc.size_bytes),
                    doc.created_at,
                    doc.title.as_deref().unwrap_or("-")
                );
            }
        }
        DocumentCommands::Signatures { document_id } => {
            let signatures = client.list_signatures(&document_id).await?;
            if signatures.is_empty() {
                println!("No signatures recorded.");
                return Ok(());
            }

            println!(
                "{:<38} {:<20} {:<6} {:<18} {:<6} Signed",
                "ID", "Signer", "Mode", "State", "Valid"
            );
            println!("{}", "-".repeat(120));
            for sig in signatures {
                println!(
                    "{:<38} {:<20} {:<6} {:<18} {:<6} {}",
                    sig.id,
                    sig.signer_id,
                    sig.modality,
                    sig.state,
                    if sig.valid { "yes" } else { "no" },
                    sig.signed_at.as_deref().unwrap_or("-")
                );
            }
        }
        DocumentCommands::Verify { document_id } => {
            let report = client.verify_document(&document_id).await?;
            print_verification(&report);
            if !report.integrity_ok || !report.drifted_signatures.is_empty() {
                anyhow::bail!("document {document_id} failed integrity verification");
            }
        }
    }
    Ok(())
}

async fn handle_sign_command(command: SignCommands, api: &ApiArgs) -> Result<()> {
    let client = get_api_client(api)?;
    let outcome = match command {
        SignCommands::Demo {
            document_id,
            comment,
        } => {
            client
                .sign_demo(&document_id, DemoSignRequest { comment })
                .await?
        }
        SignCommands::Hsm {
            document_id,
            comment,
            resign,
        } => {
            client
                .sign_hsm(&document_id, HsmSignRequest { comment, resign })
                .await?
        }
    };
    print_outcome(&outcome);
    Ok(())
}

async fn handle_token_flow_command(command: TokenFlowCommands, api: &ApiArgs) -> Result<()> {
    let client = get_api_client(api)?;
    let outcome = match command {
        TokenFlowCommands::Prepare {
            document_id,
            comment,
        } => {
            client
                .prepare_token(&document_id, TokenPrepareRequest { comment })
                .await?
        }
        TokenFlowCommands::Complete {
            document_id,
            solicitud,
            blob,
            blob_file,
            certificate_serial,
            external_reference,
        } => {
            let signature_blob = read_signature_blob(blob, blob_file.as_deref()).await?;
            client
                .complete_token(
                    &document_id,
                    TokenCompleteRequest {
                        solicitud_id: solicitud,
                        signature_blob: signature_blob.as_str().to_string(),
                        certificate_serial,
                        external_reference,
                    },
                )
                .await?
        }
        TokenFlowCommands::Reject {
            document_id,
            solicitud,
            reason,
        } => {
            client
                .reject_token(
                    &document_id,
                    TokenRejectRequest {
                        solicitud_id: solicitud,
                        reason,
                    },
                )
                .await?
        }
    };
    print_outcome(&outcome);
    Ok(())
}

/// Resolve the blob from `--blob` (already base64) or `--blob-file` (raw bytes).
async fn read_signature_blob(blob: Option<String>, blob_file: Option<&Path>) -> Result<SignatureBlob> {
    match (blob, blob_file) {
        (Some(b64), None) => SignatureBlob::parse(&b64).context("invalid --blob"),
        (None, Some(path)) => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            if bytes.is_empty() {
                anyhow::bail!("signature file {} is empty", path.display());
            }
            Ok(SignatureBlob::encode(&bytes))
        }
        (None, None) => anyhow::bail!("one of --blob or --blob-file is required"),
        (Some(_), Some(_)) => anyhow::bail!("use either --blob or --blob-file, not both"),
    }
}

async fn handle_token_command(command: TokenCommands, api: &ApiArgs) -> Result<()> {
    match command {
        TokenCommands::Generate { description } => handle_token_generate(description),
        TokenCommands::Create {
            subject,
            scopes,
            expires_in,
            description,
        } => {
            let client = get_api_client(api)?;
            let scopes = parse_scopes(&scopes)?;

            let response = client
                .create_token(CreateTokenRequest {
                    subject,
                    scopes,
                    expires_in,
                    description,
                })
                .await?;

            println!("Token created successfully!");
            println!("\nToken ID: {}", response.token_id);
            println!("Subject: {}", response.subject);
            println!("Token secret: {}", response.token_secret);
            println!("\nIMPORTANT: Save this token secret now. It cannot be recovered.");
            if let Some(expires) = response.expires_at {
                println!("Expires: {expires}");
            }
            Ok(())
        }
        TokenCommands::List => {
            let client = get_api_client(api)?;
            let tokens = client.list_tokens().await?;

            if tokens.is_empty() {
                println!("No tokens found.");
                return Ok(());
            }

            println!(
                "{:<38} {:<20} {:<34} {:<8} {:<26} {:<26} Description",
                "ID", "Subject", "Scopes", "Status", "Expires", "Last Used"
            );
            println!("{}", "-".repeat(170));
            for token in tokens {
                let status = if token.revoked_at.is_some() {
                    "revoked"
                } else {
                    "active"
                };
                println!(
                    "{:<38} {:<20} {:<34} {:<8} {:<26} {:<26} {}",
                    token.token_id,
                    token.subject,
                    token.scopes.join(","),
                    status,
                    token.expires_at.as_deref().unwrap_or("never"),
                    token.last_used_at.as_deref().unwrap_or("-"),
                    token.description.as_deref().unwrap_or("-")
                );
            }
            Ok(())
        }
        TokenCommands::Revoke { token_id } => {
            let client = get_api_client(api)?;
            client.revoke_token(&token_id).await?;
            println!("Token revoked: {token_id}");
            Ok(())
        }
    }
}

fn handle_token_generate(description: Option<String>) -> Result<()> {
    let token_secret = generate_token_secret();
    let token_hash = hash_token(&token_secret);

    println!("Token generated (save the secret - it cannot be recovered):\n");
    println!("  Secret: {token_secret}");
    println!("  Hash:   sha256:{token_hash}");
    if let Some(desc) = description {
        println!("  Description: {desc}");
    }
    println!("\nAdd to server.toml:");
    println!("  [admin]");
    println!("  token_hash = \"sha256:{token_hash}\"");

    Ok(())
}

async fn handle_whoami_command(api: &ApiArgs) -> Result<()> {
    let client = get_api_client(api)?;
    let whoami = client.whoami().await?;

    println!("Token ID: {}", whoami.token_id);
    println!("Subject: {}", whoami.subject);
    println!("Scopes: {}", whoami.scopes.join(", "));
    match &whoami.expires_at {
        Some(expires_at) => println!("Expires: {expires_at}"),
        None => println!("Expires: never"),
    }
    if let Some(description) = &whoami.description {
        println!("Description: {description}");
    }
    Ok(())
}

async fn handle_capabilities_command(api: &ApiArgs) -> Result<()> {
    let client = get_api_client(api)?;
    let caps = client.capabilities().await?;

    println!("API version: {}", caps.api_version);
    println!("Modalities: {}", caps.modalities.join(", "));
    println!("Hash algorithm: {}", caps.hash_algorithm);
    println!("Max document size: {}", format_bytes(caps.max_document_size));
    println!("Completion policy: {}", caps.completion_policy);
    println!("HSM authority: {}", caps.hsm_authority);
    Ok(())
}

async fn handle_health_command(api: &ApiArgs) -> Result<()> {
    let base_url = resolve_server(api)?;
    let client = ApiClient::new(&base_url, api.token.as_deref().unwrap_or_default())?;
    let health = client.health().await?;

    println!("Status: {}", health.status);
    println!("Server version: {}", health.version);
    println!("Client version: {}", env!("CARGO_PKG_VERSION"));

    if health.version != env!("CARGO_PKG_VERSION") {
        eprintln!(
            "Warning: version mismatch (server: {}, client: {})",
            health.version,
            env!("CARGO_PKG_VERSION")
        );
    }
    Ok(())
}

fn print_document(doc: &DocumentResponse) {
    println!("Document");
    println!("  ID: {}", doc.id);
    println!("  Case: {}", doc.case_id.as_deref().unwrap_or("-"));
    println!("  Title: {}", doc.title.as_deref().unwrap_or("-"));
    println!("  State: {}", doc.state);
    println!("  SHA-256: {}", doc.content_hash);
    println!("  Type: {}", doc.mime_type);
    println!("  Size: {}", format_bytes(doc.size_bytes));
    println!("  Created: {}", doc.created_at);
    println!("  Updated: {}", doc.updated_at);
}

fn print_signature(sig: &SignatureResponse) {
    println!("Signature");
    println!("  ID: {}", sig.id);
    println!("  Document: {}", sig.document_id);
    println!("  Signer: {}", sig.signer_id);
    println!("  Modality: {}", sig.modality);
    println!("  State: {}", sig.state);
    println!("  Valid: {}", sig.valid);
    println!("  Hash at request: {}", sig.document_hash_at_request);
    if let Some(signed_at) = &sig.signed_at {
        println!("  Signed: {signed_at}");
    }
    if let Some(serial) = &sig.certificate_serial {
        println!("  Certificate serial: {serial}");
    }
    if let Some(reference) = &sig.external_reference {
        println!("  External reference: {reference}");
    }
    if let Some(comment) = &sig.comment {
        println!("  Comment: {comment}");
    }
}

fn print_outcome(outcome: &SignatureOutcomeResponse) {
    print_signature(&outcome.signature);
    println!("Document state: {}", outcome.document_state);
    if let Some(prep) = &outcome.preparation {
        println!("\nSign the following with your token, then run `rubricactl token complete`:");
        println!("  Solicitud: {}", prep.solicitud_id);
        println!("  Hash ({}): {}", prep.algorithm, prep.document_hash);
        println!("  Nonce: {}", prep.nonce);
    }
}

fn print_verification(report: &VerificationResponse) {
    println!("Verification of {}", report.document_id);
    println!(
        "  Integrity: {}",
        if report.integrity_ok { "OK" } else { "FAILED" }
    );
    println!("  Recorded hash: {}", report.recorded_hash);
    println!(
        "  Computed hash: {}",
        report.computed_hash.as_deref().unwrap_or("-")
    );
    if let Some(err) = &report.read_error {
        println!("  Read error: {err}");
    }
    println!("  Active signatures: {}", report.active_signatures.len());
    for id in &report.drifted_signatures {
        println!("  Drifted signature: {id}");
    }
    println!("  Verified at: {}", report.verified_at);
}

fn guess_mime_type(path: &Path) -> Result<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("pdf") => Ok("application/pdf"),
        Some("xml") => Ok("application/xml"),
        Some("txt") => Ok("text/plain"),
        Some("odt") => Ok("application/vnd.oasis.opendocument.text"),
        Some("docx") => {
            Ok("application/vnd.openxmlformats-officedocument.wordprocessingml.document")
        }
        _ => anyhow::bail!(
            "cannot guess MIME type for {}; pass --mime-type",
            path.display()
        ),
    }
}

fn parse_scopes(raw: &str) -> Result<Vec<String>> {
    let scopes = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            TokenScope::parse(s)
                .map(|scope| scope.as_str().to_string())
                .map_err(|_| anyhow::anyhow!("invalid scope: {s}"))
        })
        .collect::<Result<Vec<_>>>()?;
    if scopes.is_empty() {
        anyhow::bail!("scopes cannot be empty");
    }
    Ok(scopes)
}

fn normalize_base_url(url: &str) -> Result<String> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("server URL must start with http:// or https://");
    }
    Ok(url.trim_end_matches('/').to_string())
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} bytes")
    }
}

/// Generate a random token secret using cryptographically secure RNG.
fn generate_token_secret() -> String {
    use base64::Engine;
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a token the way the server stores it.
fn hash_token(token: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
