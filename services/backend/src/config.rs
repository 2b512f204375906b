//! Environment-driven configuration.

use alloy_primitives::Address;

/// Fallback admin for local development (first anvil dev account).
const DEV_ADMIN_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    /// Trusted key material. Never logged.
    pub mnemonic: String,
    pub chain_id: u64,
    /// Absent disables the chain listener and withdrawal signing.
    pub contract_address: Option<Address>,
    pub rpc_url: String,
    /// Websocket endpoint for log subscriptions.
    pub rpc_ws_url: String,
    /// Lower-cased admin wallet addresses.
    pub admin_addresses: Vec<String>,
    pub tee_version: i32,
    pub app_port: u16,
    pub cors_origin: Option<String>,
    pub environment: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = std::env::var("ENVIRONMENT")
            .or_else(|_| std::env::var("NODE_ENV"))
            .unwrap_or_else(|_| "development".to_string());
        let is_production = environment == "production";

        let mnemonic = std::env::var("MNEMONIC")
            .map_err(|_| anyhow::anyhow!("MNEMONIC is required to sign events"))?;
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL is required"))?;

        let chain_id = match std::env::var("CHAIN_ID") {
            Ok(v) => v.parse::<u64>()?,
            Err(_) if is_production => anyhow::bail!("CHAIN_ID is required in production"),
            Err(_) => 31337,
        };

        let contract_address = match std::env::var("CLOUTCARDS_CONTRACT_ADDRESS") {
            Ok(v) if !v.trim().is_empty() => Some(v.trim().parse::<Address>()?),
            _ => None,
        };

        let rpc_url = match std::env::var("RPC_URL") {
            Ok(v) => v,
            Err(_) if is_production => anyhow::bail!("RPC_URL is required in production"),
            Err(_) => "http://localhost:8545".to_string(),
        };
        let rpc_ws_url = std::env::var("RPC_WS_URL").unwrap_or_else(|_| {
            rpc_url
                .replacen("https://", "wss://", 1)
                .replacen("http://", "ws://", 1)
        });

        let admin_addresses: Vec<String> = match std::env::var("ADMIN_ADDRESSES") {
            Ok(v) => v
                .split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) if is_production => anyhow::bail!("ADMIN_ADDRESSES is required in production"),
            Err(_) => vec![DEV_ADMIN_ADDRESS.to_string()],
        };

        let tee_version = std::env::var("TEE_VERSION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        let app_port = std::env::var("APP_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);
        let cors_origin = std::env::var("CORS_ORIGIN").ok().filter(|v| !v.is_empty());

        Ok(Self {
            database_url,
            mnemonic,
            chain_id,
            contract_address,
            rpc_url,
            rpc_ws_url,
            admin_addresses,
            tee_version,
            app_port,
            cors_origin,
            environment,
        })
    }

    pub fn is_admin(&self, wallet: &str) -> bool {
        let wallet = wallet.to_ascii_lowercase();
        self.admin_addresses.iter().any(|a| *a == wallet)
    }
}
