//! Mining pool attribution for coinbase transactions.
//!
//! Rules run in list order (payout address, coinbase tag, known block hash by
//! default). Each rule is tried against every pool, in configuration order,
//! before the next rule is consulted, so a payout address listed for any pool
//! outranks a coinbase tag of another. Without any match a `/signal/` in the
//! coinbase text is used as the miner name.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::domain::display::hex_to_string;
use crate::domain::{AppError, ConfigError, MinerInfo, PoolConfig, PoolMetadata, Transaction};

static SIGNAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(.*)/").expect("signal pattern is valid"));

/// Coinbase data a rule can inspect
#[derive(Debug, Clone, Copy)]
pub struct CoinbaseContext<'a> {
    pub tx: &'a Transaction,
    pub coinbase_str: &'a str,
}

/// A successful rule match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub metadata: PoolMetadata,
    pub identified_by: String,
}

/// One attribution heuristic, evaluated against a single pool entry
pub trait AttributionRule: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self, pool: &PoolConfig, ctx: &CoinbaseContext<'_>) -> Option<RuleMatch>;
}

/// First output's first address equals a known payout address
#[derive(Debug, Default)]
pub struct PayoutAddressRule;

impl AttributionRule for PayoutAddressRule {
    fn name(&self) -> &str {
        "payout_address"
    }

    fn check(&self, pool: &PoolConfig, ctx: &CoinbaseContext<'_>) -> Option<RuleMatch> {
        let address = ctx.tx.vout.first()?.script_pub_key.addresses.first()?;
        pool.payout_addresses.get(address).map(|metadata| RuleMatch {
            metadata: metadata.clone(),
            identified_by: format!("payout address {address}"),
        })
    }
}

/// Coinbase text contains a known tag (case-insensitive)
#[derive(Debug, Default)]
pub struct CoinbaseTagRule;

impl AttributionRule for CoinbaseTagRule {
    fn name(&self) -> &str {
        "coinbase_tag"
    }

    fn check(&self, pool: &PoolConfig, ctx: &CoinbaseContext<'_>) -> Option<RuleMatch> {
        let coinbase_lower = ctx.coinbase_str.to_lowercase();
        pool.coinbase_tags
            .iter()
            .find(|(tag, _)| coinbase_lower.contains(&tag.to_lowercase()))
            .map(|(tag, metadata)| RuleMatch {
                metadata: metadata.clone(),
                identified_by: format!("coinbase tag '{tag}' in '{}'", ctx.coinbase_str),
            })
    }
}

/// Block hash listed for the pool
#[derive(Debug, Default)]
pub struct BlockHashRule;

impl AttributionRule for BlockHashRule {
    fn name(&self) -> &str {
        "block_hash"
    }

    fn check(&self, pool: &PoolConfig, ctx: &CoinbaseContext<'_>) -> Option<RuleMatch> {
        let blockhash = ctx.tx.blockhash.as_deref()?;
        pool.block_hashes.get(blockhash).map(|metadata| RuleMatch {
            metadata: metadata.clone(),
            identified_by: format!("known block hash '{blockhash}'"),
        })
    }
}

/// Default rule order
pub fn default_rules() -> Vec<Box<dyn AttributionRule>> {
    vec![
        Box::new(PayoutAddressRule),
        Box::new(CoinbaseTagRule),
        Box::new(BlockHashRule),
    ]
}

pub struct MinerResolver {
    pools: Vec<PoolConfig>,
    rules: Vec<Box<dyn AttributionRule>>,
}

impl MinerResolver {
    pub fn new(pools: Vec<PoolConfig>) -> Self {
        Self {
            pools,
            rules: default_rules(),
        }
    }

    /// Replace the rule list (builder pattern)
    #[must_use]
    pub fn with_rules(mut self, rules: Vec<Box<dyn AttributionRule>>) -> Self {
        self.rules = rules;
        self
    }

    /// Load pool definitions from a JSON file holding one pool object or an
    /// array of them
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            ConfigError::InvalidValue {
                field: "mining_pools_path".to_string(),
                message: format!("{}: {}", path.display(), e),
            }
        })?;
        let pools = parse_pool_configs(&raw)?;
        info!(path = %path.display(), pools = pools.len(), "Loaded mining pool configuration");
        Ok(Self::new(pools))
    }

    pub fn pools(&self) -> &[PoolConfig] {
        &self.pools
    }

    /// Attribute a coinbase transaction; `None` for any other transaction
    #[instrument(skip(self, tx), fields(txid = %tx.txid))]
    pub fn attribute(&self, tx: &Transaction) -> Option<MinerInfo> {
        if !tx.is_coinbase() {
            return None;
        }

        let coinbase_str = coinbase_text(tx);
        let mut miner = MinerInfo {
            possible_signal: SIGNAL_RE
                .captures(&coinbase_str)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string()),
            coinbase_str,
            ..Default::default()
        };

        let ctx = CoinbaseContext {
            tx,
            coinbase_str: &miner.coinbase_str,
        };
        let found = self.rules.iter().find_map(|rule| {
            self.pools
                .iter()
                .find_map(|pool| rule.check(pool, &ctx))
                .map(|m| (rule.name(), m))
        });

        match found {
            Some((rule, matched)) => {
                debug!(rule = %rule, pool = %matched.metadata.name, "Miner identified");
                miner.merge(&matched.metadata);
                miner.identified_by = Some(matched.identified_by);
            }
            None => {
                if let Some(signal) = miner.possible_signal.clone() {
                    miner.name = Some(signal);
                    miner.identified_by = Some("properly formatted signal e.g. '/tag/'".to_string());
                }
            }
        }

        Some(miner)
    }
}

/// Parse pool definitions (single object or array)
pub fn parse_pool_configs(raw: &str) -> Result<Vec<PoolConfig>, ConfigError> {
    let invalid = |e: serde_json::Error| ConfigError::InvalidValue {
        field: "mining_pools".to_string(),
        message: e.to_string(),
    };
    match serde_json::from_str::<Value>(raw).map_err(invalid)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(invalid))
            .collect(),
        other => Ok(vec![serde_json::from_value(other).map_err(invalid)?]),
    }
}

/// Human-readable coinbase data.
///
/// Uses the coinbase input script when present, otherwise the data pushes of
/// the last output (asm tokens after the first two). Hex is decoded as lossy
/// UTF-8; anything that is not hex is used verbatim.
fn coinbase_text(tx: &Transaction) -> String {
    if let Some(script) = tx.vin.first().and_then(|vin| vin.coinbase.as_deref()) {
        return hex_to_string(script).unwrap_or_else(|| script.to_string());
    }

    let Some(last) = tx.vout.last() else {
        return String::new();
    };
    let pushes: Vec<&str> = last.script_pub_key.asm.split(' ').skip(2).collect();
    hex_to_string(&pushes.concat()).unwrap_or_else(|| pushes.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ScriptPubKey, TxInput, TxOutput};

    fn meta(name: &str) -> PoolMetadata {
        PoolMetadata {
            name: name.to_string(),
            link: Some(format!("https://{}.example", name.to_lowercase())),
            ..Default::default()
        }
    }

    fn coinbase_tx(coinbase_hex: &str, payout: &str, blockhash: &str) -> Transaction {
        Transaction {
            txid: "cb".to_string(),
            blockhash: Some(blockhash.to_string()),
            vin: vec![TxInput {
                coinbase: Some(coinbase_hex.to_string()),
                ..Default::default()
            }],
            vout: vec![TxOutput {
                script_pub_key: ScriptPubKey {
                    addresses: vec![payout.to_string()],
                    ..Default::default()
                },
                ..Default::default()
            }],
        }
    }

    fn pools() -> Vec<PoolConfig> {
        let mut first = PoolConfig::default();
        first
            .coinbase_tags
            .insert("AlphaPool".to_string(), meta("Alpha"));

        let mut second = PoolConfig::default();
        second
            .payout_addresses
            .insert("nexa:beta".to_string(), meta("Beta"));
        second
            .block_hashes
            .insert("00ff".to_string(), meta("BetaHash"));

        vec![first, second]
    }

    #[test]
    fn test_non_coinbase_is_not_attributed() {
        let resolver = MinerResolver::new(pools());
        let tx = Transaction {
            vin: vec![TxInput {
                txid: Some("aa".to_string()),
                vout: Some(0),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(resolver.attribute(&tx), None);
    }

    #[test]
    fn test_coinbase_tag_match_is_case_insensitive() {
        let resolver = MinerResolver::new(pools());
        // "mined by alphapool"
        let tx = coinbase_tx("6d696e656420627920616c706861706f6f6c", "nexa:other", "11");

        let miner = resolver.attribute(&tx).unwrap();

        assert_eq!(miner.coinbase_str, "mined by alphapool");
        assert_eq!(miner.name.as_deref(), Some("Alpha"));
        assert_eq!(miner.link.as_deref(), Some("https://alpha.example"));
        assert!(miner.identified_by.unwrap().starts_with("coinbase tag 'AlphaPool'"));
    }

    #[test]
    fn test_payout_address_beats_other_pools_tag() {
        // Matches pool 1 by tag and pool 2 by payout address
        let resolver = MinerResolver::new(pools());
        let tx = coinbase_tx("416c706861506f6f6c", "nexa:beta", "11");

        let miner = resolver.attribute(&tx).unwrap();

        assert_eq!(miner.name.as_deref(), Some("Beta"));
        assert_eq!(miner.identified_by.as_deref(), Some("payout address nexa:beta"));
    }

    #[test]
    fn test_pool_order_breaks_ties_within_a_rule() {
        let mut first = PoolConfig::default();
        first.coinbase_tags.insert("pool".to_string(), meta("First"));
        let mut second = PoolConfig::default();
        second.coinbase_tags.insert("pool".to_string(), meta("Second"));

        let resolver = MinerResolver::new(vec![first, second]);
        // "pool"
        let tx = coinbase_tx("706f6f6c", "nexa:other", "11");

        assert_eq!(resolver.attribute(&tx).unwrap().name.as_deref(), Some("First"));
    }

    #[test]
    fn test_payout_address_beats_block_hash_within_pool() {
        let resolver = MinerResolver::new(pools());
        let tx = coinbase_tx("00", "nexa:beta", "00ff");
        let miner = resolver.attribute(&tx).unwrap();
        assert_eq!(miner.name.as_deref(), Some("Beta"));
        assert_eq!(miner.identified_by.as_deref(), Some("payout address nexa:beta"));
    }

    #[test]
    fn test_block_hash_rule() {
        let resolver = MinerResolver::new(pools());
        let tx = coinbase_tx("00", "nexa:unknown", "00ff");
        let miner = resolver.attribute(&tx).unwrap();
        assert_eq!(miner.name.as_deref(), Some("BetaHash"));
        assert_eq!(miner.identified_by.as_deref(), Some("known block hash '00ff'"));
    }

    #[test]
    fn test_signal_used_only_without_pool_match() {
        let resolver = MinerResolver::new(pools());
        // "xx/SoloMiner/yy"
        let tx = coinbase_tx("78782f536f6c6f4d696e65722f7979", "nexa:unknown", "11");

        let miner = resolver.attribute(&tx).unwrap();

        assert_eq!(miner.possible_signal.as_deref(), Some("SoloMiner"));
        assert_eq!(miner.name.as_deref(), Some("SoloMiner"));
        assert_eq!(
            miner.identified_by.as_deref(),
            Some("properly formatted signal e.g. '/tag/'")
        );

        // A matched pool keeps its own name even when a signal is present
        let tx = coinbase_tx("2f416c706861506f6f6c2f", "nexa:unknown", "11");
        let miner = resolver.attribute(&tx).unwrap();
        assert_eq!(miner.possible_signal.as_deref(), Some("AlphaPool"));
        assert_eq!(miner.name.as_deref(), Some("Alpha"));
    }

    #[test]
    fn test_unidentified_miner_keeps_coinbase_text() {
        let resolver = MinerResolver::new(vec![]);
        let tx = coinbase_tx("68656c6c6f", "nexa:unknown", "11");
        let miner = resolver.attribute(&tx).unwrap();
        assert_eq!(miner.coinbase_str, "hello");
        assert_eq!(miner.name, None);
        assert_eq!(miner.identified_by, None);
    }

    #[test]
    fn test_rules_can_be_reordered() {
        let rules: Vec<Box<dyn AttributionRule>> =
            vec![Box::new(BlockHashRule), Box::new(PayoutAddressRule)];
        let resolver = MinerResolver::new(pools()).with_rules(rules);
        let tx = coinbase_tx("00", "nexa:beta", "00ff");
        assert_eq!(resolver.attribute(&tx).unwrap().name.as_deref(), Some("BetaHash"));
    }

    #[test]
    fn test_custom_data_from_last_output() {
        let resolver = MinerResolver::new(vec![]);
        let tx = Transaction {
            vout: vec![TxOutput {
                script_pub_key: ScriptPubKey {
                    asm: "OP_RETURN 0 2f4e6578612f 7631".to_string(),
                    ..Default::default()
                },
                ..Default::default()
            }],
            ..Default::default()
        };

        let miner = resolver.attribute(&tx).unwrap();

        assert_eq!(miner.coinbase_str, "/Nexa/v1");
        assert_eq!(miner.possible_signal.as_deref(), Some("Nexa"));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let resolver = MinerResolver::new(vec![]);
        let tx = coinbase_tx("ff2f782f", "nexa:unknown", "11");
        let miner = resolver.attribute(&tx).unwrap();
        assert_eq!(miner.coinbase_str, "\u{fffd}/x/");
        assert_eq!(miner.possible_signal.as_deref(), Some("x"));
    }

    #[test]
    fn test_parse_pool_configs_accepts_object_or_array() {
        let single = r#"{"coinbase_tags": {"/Pool/": {"name": "Pool", "link": "https://pool"}}}"#;
        let pools = parse_pool_configs(single).unwrap();
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].coinbase_tags["/Pool/"].name, "Pool");

        let many = r#"[{"name": "a"}, {"payout_addresses": {"nexa:q": {"name": "Q"}}}]"#;
        let pools = parse_pool_configs(many).unwrap();
        assert_eq!(pools.len(), 2);
        assert_eq!(pools[1].payout_addresses["nexa:q"].link, None);

        assert!(parse_pool_configs("[1, 2]").is_err());
    }

    #[tokio::test]
    async fn test_from_file_loads_pools() {
        let path = std::env::temp_dir().join(format!("mining-pools-{}.json", std::process::id()));
        tokio::fs::write(&path, r#"[{"coinbase_tags": {"alpha": {"name": "Alpha"}}}]"#)
            .await
            .unwrap();

        let resolver = tokio_test::assert_ok!(MinerResolver::from_file(&path).await);
        assert_eq!(resolver.pools().len(), 1);
        tokio::fs::remove_file(&path).await.unwrap();

        let missing = MinerResolver::from_file(&path).await;
        assert!(matches!(missing, Err(AppError::Config(ConfigError::InvalidValue { .. }))));
    }

    #[test]
    fn test_pool_map_keeps_insertion_order() {
        let raw = r#"{"coinbase_tags": {"zeta": {"name": "Z"}, "alpha": {"name": "A"}}}"#;
        let pools = parse_pool_configs(raw).unwrap();
        let keys: Vec<&String> = pools[0].coinbase_tags.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }
}
