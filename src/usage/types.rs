//! Data model for `ccusage blocks --json` output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level object on ccusage stdout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlocksResponse {
    /// Billing blocks, most recent first
    #[serde(default)]
    pub blocks: Vec<Block>,
}

/// One billing/usage window reported by ccusage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub actual_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, rename = "costUSD")]
    pub cost_usd: f64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub token_counts: TokenCounts,
    #[serde(default)]
    pub burn_rate: Option<BurnRate>,
    #[serde(default)]
    pub projection: Option<Projection>,
    #[serde(default)]
    pub token_limit_status: Option<TokenLimitStatus>,
}

/// Per-category token counts within a block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenCounts {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

/// Current consumption rate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnRate {
    #[serde(default)]
    pub tokens_per_minute: f64,
    #[serde(default)]
    pub cost_per_hour: f64,
}

/// Projected end-of-block usage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub remaining_minutes: u64,
}

/// Token limit standing, present when `--token-limit` is passed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenLimitStatus {
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub projected_usage: u64,
    #[serde(default)]
    pub percent_used: f64,
    #[serde(default)]
    pub status: String,
}

/// Decoded usage snapshot from one poll.
///
/// Immutable once built; a new snapshot fully replaces the old one.
#[derive(Debug, Clone, Serialize)]
pub struct UsageSnapshot {
    /// The active billing block, if any
    pub block: Option<Block>,
    /// When this snapshot was fetched
    pub fetched_at: DateTime<Utc>,
}

impl UsageSnapshot {
    /// Build a snapshot from decoded blocks, preferring the active one
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        let block = blocks
            .iter()
            .find(|b| b.is_active)
            .cloned()
            .or_else(|| blocks.into_iter().next());
        Self {
            block,
            fetched_at: Utc::now(),
        }
    }

    /// Id of the active block, if one is present
    pub fn active_id(&self) -> Option<&str> {
        self.block
            .as_ref()
            .filter(|b| b.is_active)
            .map(|b| b.id.as_str())
    }

    /// Percent of the token limit used, preferring ccusage's own figure
    pub fn percent_used(&self, token_limit: Option<u64>) -> Option<f64> {
        let block = self.block.as_ref()?;
        if let Some(status) = &block.token_limit_status {
            return Some(status.percent_used);
        }
        let limit = token_limit?;
        if limit == 0 {
            return None;
        }
        Some(block.total_tokens as f64 / limit as f64 * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn block(id: &str, active: bool) -> Block {
        Block {
            id: id.to_string(),
            start_time: Utc::now(),
            end_time: Utc::now(),
            actual_end_time: None,
            is_active: active,
            cost_usd: 1.25,
            total_tokens: 10_000,
            token_counts: TokenCounts::default(),
            burn_rate: None,
            projection: None,
            token_limit_status: None,
        }
    }

    #[test]
    fn test_from_blocks_prefers_active() {
        let snapshot = UsageSnapshot::from_blocks(vec![block("old", false), block("live", true)]);
        assert_eq!(snapshot.active_id(), Some("live"));
    }

    #[test]
    fn test_from_blocks_falls_back_to_first() {
        let snapshot = UsageSnapshot::from_blocks(vec![block("only", false)]);
        assert!(snapshot.block.is_some());
        assert_eq!(snapshot.active_id(), None);
    }

    #[test]
    fn test_percent_used_from_limit_status() {
        let mut b = block("live", true);
        b.token_limit_status = Some(TokenLimitStatus {
            limit: 50_000,
            projected_usage: 30_000,
            percent_used: 20.0,
            status: "ok".to_string(),
        });
        let snapshot = UsageSnapshot::from_blocks(vec![b]);
        assert_eq!(snapshot.percent_used(None), Some(20.0));
    }

    #[test]
    fn test_percent_used_from_configured_limit() {
        let snapshot = UsageSnapshot::from_blocks(vec![block("live", true)]);
        assert_eq!(snapshot.percent_used(Some(40_000)), Some(25.0));
        assert_eq!(snapshot.percent_used(Some(0)), None);
        assert_eq!(snapshot.percent_used(None), None);
    }

    #[test]
    fn test_decode_camel_case() {
        let json = r#"{
            "blocks": [{
                "id": "b1",
                "startTime": "2026-08-26T10:00:00Z",
                "endTime": "2026-08-26T15:00:00Z",
                "isActive": true,
                "costUSD": 2.5,
                "totalTokens": 1234,
                "tokenCounts": {"inputTokens": 100, "outputTokens": 200},
                "burnRate": {"tokensPerMinute": 42.0, "costPerHour": 1.1},
                "projection": {"totalTokens": 9000, "totalCost": 4.0, "remainingMinutes": 90}
            }]
        }"#;
        let resp: BlocksResponse = serde_json::from_str(json).expect("should decode");
        assert_eq!(resp.blocks.len(), 1);
        let b = &resp.blocks[0];
        assert!(b.is_active);
        assert_eq!(b.total_tokens, 1234);
        assert_eq!(b.token_counts.input_tokens, 100);
        assert_eq!(b.burn_rate.as_ref().map(|r| r.tokens_per_minute), Some(42.0));
    }
}
