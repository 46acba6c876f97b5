use super::order::DEFAULT_ORDER_PREFIX;
use anyhow::Context;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

// one year of minutes, and ten years of days
pub const MAX_EDIT_WINDOW_MINUTES: i64 = 366 * 24 * 60;
pub const MAX_RECENT_PAYMENT_DAYS: i64 = 3_660;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopConfig {
    pub db_path: PathBuf,
    pub order_prefix: String,
    // how long an author may amend a status entry they wrote
    pub edit_window_minutes: i64,
    pub recent_payment_days: i64,
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("print-shop.db"),
            order_prefix: DEFAULT_ORDER_PREFIX.to_string(),
            edit_window_minutes: 15,
            recent_payment_days: 30,
        }
    }
}

// Missing variables fall back to the default, malformed ones are an error.
fn read_var<T, L>(lookup: &L, name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    L: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: '{}'", name, raw)),
        _ => Ok(default),
    }
}

fn read_bounded<L>(lookup: &L, name: &str, default: i64, max: i64) -> anyhow::Result<i64>
where
    L: Fn(&str) -> Option<String>,
{
    let value = read_var(lookup, name, default)?;
    if !(0..=max).contains(&value) {
        anyhow::bail!("invalid value for {}: {} is outside 0..={}", name, value, max);
    }
    Ok(value)
}

impl ShopConfig {
    /// Reads `SHOP_*` variables, loading a `.env` file first when present.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|name| env::var(name).ok())?;

        tracing::info!(db = %config.db_path.display(), "shop configuration loaded");
        Ok(config)
    }

    /// Builds the config from any variable source.
    pub fn from_lookup<L>(lookup: L) -> anyhow::Result<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            db_path: read_var(&lookup, "SHOP_DB_PATH", defaults.db_path)?,
            order_prefix: read_var(&lookup, "SHOP_ORDER_PREFIX", defaults.order_prefix)?,
            edit_window_minutes: read_bounded(
                &lookup,
                "SHOP_EDIT_WINDOW_MINUTES",
                defaults.edit_window_minutes,
                MAX_EDIT_WINDOW_MINUTES,
            )?,
            recent_payment_days: read_bounded(
                &lookup,
                "SHOP_RECENT_PAYMENT_DAYS",
                defaults.recent_payment_days,
                MAX_RECENT_PAYMENT_DAYS,
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn unset_variables_use_defaults() {
        let value: i64 = read_var(&vars(&[]), "SHOP_EDIT_WINDOW_MINUTES", 42).unwrap();
        assert_eq!(value, 42);
        assert_eq!(ShopConfig::from_lookup(vars(&[])).unwrap(), ShopConfig::default());
    }

    #[test]
    fn defaults() {
        let config = ShopConfig::default();
        assert_eq!(config.order_prefix, "PS");
        assert_eq!(config.edit_window_minutes, 15);
        assert_eq!(config.recent_payment_days, 30);
    }

    #[test]
    fn reads_every_variable() {
        let config = ShopConfig::from_lookup(vars(&[
            ("SHOP_DB_PATH", "/var/lib/shop.db"),
            ("SHOP_ORDER_PREFIX", "AC"),
            ("SHOP_EDIT_WINDOW_MINUTES", " 30 "),
            ("SHOP_RECENT_PAYMENT_DAYS", "7"),
        ]))
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/var/lib/shop.db"));
        assert_eq!(config.order_prefix, "AC");
        assert_eq!(config.edit_window_minutes, 30);
        assert_eq!(config.recent_payment_days, 7);
    }

    #[test]
    fn malformed_values_name_the_variable() {
        let err = ShopConfig::from_lookup(vars(&[("SHOP_EDIT_WINDOW_MINUTES", "abc")]))
            .unwrap_err();
        assert!(err.to_string().contains("SHOP_EDIT_WINDOW_MINUTES"));

        let err = ShopConfig::from_lookup(vars(&[("SHOP_RECENT_PAYMENT_DAYS", "-5")]))
            .unwrap_err();
        assert!(err.to_string().contains("SHOP_RECENT_PAYMENT_DAYS"));
    }

    #[test]
    fn windows_are_bounded() {
        let err = ShopConfig::from_lookup(vars(&[(
            "SHOP_EDIT_WINDOW_MINUTES",
            "1000000000000",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("SHOP_EDIT_WINDOW_MINUTES"));

        let err = ShopConfig::from_lookup(vars(&[(
            "SHOP_RECENT_PAYMENT_DAYS",
            "9223372036854775807",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("SHOP_RECENT_PAYMENT_DAYS"));

        let at_limit = ShopConfig::from_lookup(vars(&[(
            "SHOP_EDIT_WINDOW_MINUTES",
            MAX_EDIT_WINDOW_MINUTES.to_string().as_str(),
        )]))
        .unwrap();
        assert_eq!(at_limit.edit_window_minutes, MAX_EDIT_WINDOW_MINUTES);
    }

    #[test]
    fn from_env_reports_the_malformed_variable() {
        // the only test in this binary touching the process environment
        unsafe { env::set_var("SHOP_ORDER_PREFIX", "EV") };
        unsafe { env::set_var("SHOP_RECENT_PAYMENT_DAYS", "abc") };
        let result = ShopConfig::from_env();
        unsafe { env::remove_var("SHOP_RECENT_PAYMENT_DAYS") };
        let loaded = ShopConfig::from_env();
        unsafe { env::remove_var("SHOP_ORDER_PREFIX") };

        let err = result.unwrap_err();
        assert!(err.to_string().contains("SHOP_RECENT_PAYMENT_DAYS"));
        assert_eq!(loaded.unwrap().order_prefix, "EV");
    }
}
