use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub mpesa: MpesaConfig,
}

/// Daraja (Safaricom M-Pesa) credentials and endpoints.
#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub shortcode: String,
    pub passkey: String,
    pub callback_url: String,
    pub account_reference: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let jwt_secret = env::var("JWT_SECRET")?;
        Ok(Self {
            port,
            database_url,
            host,
            jwt_secret,
            mpesa: MpesaConfig::from_env()?,
        })
    }
}

impl MpesaConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let base_url = env::var("MPESA_BASE_URL")
            .unwrap_or_else(|_| "https://sandbox.safaricom.co.ke".to_string());
        Ok(Self {
            base_url,
            consumer_key: env::var("MPESA_CONSUMER_KEY")?,
            consumer_secret: env::var("MPESA_CONSUMER_SECRET")?,
            shortcode: env::var("MPESA_SHORTCODE")?,
            passkey: env::var("MPESA_PASSKEY")?,
            callback_url: env::var("MPESA_CALLBACK_URL")?,
            account_reference: env::var("MPESA_ACCOUNT_REFERENCE")
                .unwrap_or_else(|_| "GlowHub".to_string()),
        })
    }
}
