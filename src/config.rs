use std::{env, path::PathBuf};

use anyhow::{Context, bail};

use crate::receipt::ShopInfo;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub order_number_prefix: String,
    pub print_on_checkout: bool,
    pub printer: PrinterConfig,
    pub shop: ShopInfo,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrinterKind {
    /// No printer attached; receipts are only logged.
    Disabled,
    /// Raw ESC/POS over TCP, `host:port`.
    Network(String),
    /// Character device or spool file, e.g. `/dev/usb/lp0`.
    Device(PathBuf),
}

#[derive(Debug, Clone)]
pub struct PrinterConfig {
    pub kind: PrinterKind,
    /// Paper width in characters (32 for 58mm, 48 for 80mm).
    pub width: usize,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            kind: PrinterKind::Disabled,
            width: 32,
        }
    }
}

impl AppConfig {
    /// Defaults for everything except the database and token secret.
    pub fn new(database_url: impl Into<String>, jwt_secret: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            host: "127.0.0.1".to_string(),
            port: 8080,
            jwt_secret: jwt_secret.into(),
            order_number_prefix: "TMA".to_string(),
            print_on_checkout: true,
            printer: PrinterConfig::default(),
            shop: ShopInfo::default(),
            cors_origins: Vec::new(),
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET is not set")?;
        let mut config = Self::new(database_url, jwt_secret);

        if let Ok(host) = env::var("APP_HOST") {
            config.host = host;
        }
        if let Some(port) = env::var("APP_PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
            config.port = port;
        }
        if let Ok(prefix) = env::var("ORDER_NUMBER_PREFIX") {
            config.order_number_prefix = validate_prefix(&prefix)?;
        }
        if let Ok(flag) = env::var("PRINT_ON_CHECKOUT") {
            config.print_on_checkout = parse_flag(&flag);
        }
        config.printer = printer_from_env()?;

        if let Ok(name) = env::var("SHOP_NAME") {
            config.shop.name = name;
        }
        if let Ok(tagline) = env::var("SHOP_TAGLINE") {
            config.shop.tagline = Some(tagline).filter(|t| !t.is_empty());
        }
        if let Ok(contact) = env::var("SHOP_CONTACT") {
            config.shop.contact = Some(contact).filter(|c| !c.is_empty());
        }
        if let Ok(origins) = env::var("CORS_ORIGINS") {
            config.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }

        Ok(config)
    }
}

fn printer_from_env() -> anyhow::Result<PrinterConfig> {
    let width = env::var("PRINTER_WIDTH")
        .ok()
        .and_then(|w| w.parse::<usize>().ok())
        .filter(|w| *w >= 24)
        .unwrap_or(32);
    let interface = env::var("PRINTER_INTERFACE").ok();

    let kind = match env::var("PRINTER_TYPE").ok().as_deref().map(str::trim) {
        None | Some("") | Some("none") => PrinterKind::Disabled,
        Some("network") => {
            let addr = interface.context("PRINTER_INTERFACE must be host:port for network printers")?;
            PrinterKind::Network(addr)
        }
        Some("device") | Some("usb") => PrinterKind::Device(PathBuf::from(
            interface.unwrap_or_else(|| "/dev/usb/lp0".to_string()),
        )),
        Some(other) => bail!("unsupported PRINTER_TYPE {other:?}"),
    };

    Ok(PrinterConfig { kind, width })
}

/// Order number prefixes are embedded in LIKE patterns, so keep them alphanumeric.
pub fn validate_prefix(prefix: &str) -> anyhow::Result<String> {
    let prefix = prefix.trim();
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        bail!("ORDER_NUMBER_PREFIX must be non-empty and alphanumeric, got {prefix:?}");
    }
    Ok(prefix.to_ascii_uppercase())
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_uppercased_and_checked() {
        assert_eq!(validate_prefix(" tma ").unwrap(), "TMA");
        assert!(validate_prefix("TM-A").is_err());
        assert!(validate_prefix("").is_err());
        assert!(validate_prefix("T%").is_err());
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert!(parse_flag("true"));
        assert!(parse_flag("ON"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("nope"));
    }
}
