//! fhevm-client CLI
//!
//! Offline helpers (value validation, authorization preview) plus a one-shot
//! decryption call signed with a local private key.
//!
//! Configuration comes from `--config <file.json>`, else from `FHEVM_*`
//! environment variables when `FHEVM_CHAIN_ID` is set, else from the chain
//! preset for `--chain-id` (Sepolia by default).

use std::path::PathBuf;
use std::str::FromStr;

use alloy_signer_local::PrivateKeySigner;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fhevm_client::resilience::retry_if;
use fhevm_client::signer::sign_message;
use fhevm_client::{
    Authorization, AuthorizationMessage, ClientError, DecryptionRequest, GatewayClient, PublicKey,
    RetryPolicy,
};
use fhevm_core::{
    parse_address, parse_handle, validate, ClientConfig, EncryptedType, EncryptionContext,
    PlainValue, SEPOLIA_CHAIN_ID, SUPPORTED_CHAINS, U256,
};

#[derive(Parser, Debug)]
#[command(name = "fhevm-client")]
#[command(about = "fhEVM client utilities: validate inputs, preview authorizations, decrypt handles")]
struct Args {
    /// JSON client configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Chain id used when no config file or environment is given
    #[arg(long, global = true)]
    chain_id: Option<u64>,

    /// Override the gateway URL
    #[arg(long, global = true)]
    gateway_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that a value fits an encrypted type (e.g. `euint8 255`)
    Validate {
        /// ebool, euint8, euint16, euint32, euint64, euint128 or eaddress
        ty: String,
        /// `true`/`false`, a decimal integer or 0x-prefixed hex
        value: String,
    },

    /// Print the EIP-712 authorization typed data and its signing hash
    Authorization {
        #[arg(long)]
        contract: String,
        /// Hex-encoded public key
        #[arg(long)]
        public_key: String,
    },

    /// Sign an authorization with a local key and decrypt one handle
    Decrypt {
        #[arg(long)]
        handle: String,
        #[arg(long)]
        contract: String,
        #[arg(long)]
        user: String,
        /// Hex-encoded public key
        #[arg(long)]
        public_key: String,
        /// Hex-encoded secp256k1 private key
        #[arg(long, env = "FHEVM_PRIVATE_KEY", hide_env_values = true)]
        private_key: String,
        /// Gateway attempts, including the first one
        #[arg(long, default_value_t = 3)]
        attempts: u32,
    },

    /// List chains with built-in presets
    Chains,
}

fn load_config(args: &Args) -> Result<ClientConfig> {
    let mut config = if let Some(path) = &args.config {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str::<ClientConfig>(&raw)
            .with_context(|| format!("parsing {}", path.display()))?
    } else if args.chain_id.is_none() && std::env::var("FHEVM_CHAIN_ID").is_ok() {
        ClientConfig::from_env()?
    } else {
        ClientConfig::for_chain(args.chain_id.unwrap_or(SEPOLIA_CHAIN_ID))
    };

    if let Some(url) = &args.gateway_url {
        config = config.with_gateway_url(url.clone());
    }

    config.validate()?;
    Ok(config)
}

fn parse_plain_value(raw: &str) -> Result<PlainValue> {
    match raw.trim() {
        "true" => Ok(PlainValue::Bool(true)),
        "false" => Ok(PlainValue::Bool(false)),
        other => {
            let value = U256::from_str(other).with_context(|| format!("not an integer: {other}"))?;
            Ok(PlainValue::Uint(value))
        }
    }
}

fn parse_public_key(raw: &str) -> Result<PublicKey> {
    let bytes = hex::decode(raw.trim().trim_start_matches("0x")).context("public key is not hex")?;
    if bytes.is_empty() {
        bail!("public key is empty");
    }
    Ok(PublicKey::new(bytes))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    match &args.command {
        Command::Validate { ty, value } => {
            let ty = EncryptedType::from_str(ty)?;
            let value = parse_plain_value(value)?;
            validate(&value, ty)?;
            println!("{value} fits {ty} (max {})", ty.max_value());
        }

        Command::Authorization {
            contract,
            public_key,
        } => {
            let config = load_config(&args)?;
            let message = AuthorizationMessage::new(
                config.chain_id,
                parse_address(contract)?,
                parse_public_key(public_key)?,
            );

            println!("{}", serde_json::to_string_pretty(&message.to_json())?);
            println!("signing hash: {}", message.signing_hash());
        }

        Command::Decrypt {
            handle,
            contract,
            user,
            public_key,
            private_key,
            attempts,
        } => {
            let config = load_config(&args)?;
            let handle = parse_handle(handle)?;
            let context = EncryptionContext::new(parse_address(contract)?, parse_address(user)?);
            let public_key = parse_public_key(public_key)?;
            let wallet = PrivateKeySigner::from_str(private_key.trim_start_matches("0x"))
                .context("invalid private key")?;

            tracing::info!(
                chain_id = config.chain_id,
                gateway = %config.gateway_url,
                contract = %context.contract_address,
                signer = %wallet.address(),
                "Decrypting handle"
            );

            let message =
                AuthorizationMessage::new(config.chain_id, context.contract_address, public_key);
            let signature = sign_message(&message, Some(&wallet)).await?;
            let authorization = Authorization {
                signature,
                public_key: message.public_key().clone(),
            };

            let gateway = GatewayClient::from_config(&config)?;
            let request = DecryptionRequest::new(&handle, &context, &authorization);
            let policy = RetryPolicy {
                max_attempts: *attempts,
                ..RetryPolicy::default()
            };

            let value = retry_if(
                &policy,
                || gateway.request_decryption(&request),
                ClientError::is_retryable,
            )
            .await
            .map_err(|e| anyhow::anyhow!("{} ({})", e, e.code()))?;

            println!("{value}");
        }

        Command::Chains => {
            for preset in SUPPORTED_CHAINS {
                println!("{:>10}  {:<10} {}", preset.chain_id, preset.name, preset.gateway_url);
            }
        }
    }

    Ok(())
}
