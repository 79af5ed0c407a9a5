//! LI.FI Cross-Chain Quote Client
//!
//! Endpoints:
//! - `GET /v1/quote`: route + estimated output + itemized gas/fee costs
//! - `GET /v1/token`: token metadata (decimals)
//! - `GET /v1/chains`: supported chain ids (for error messages)
//! - `GET /v1/gas/prices`: per-chain gas prices (fallback gas estimate)
//!
//! Amounts on the wire are raw integer strings; conversion to/from token
//! units goes through `rust_decimal` to avoid float rounding of 18-decimal values.

use async_trait::async_trait;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use super::lenient_f64;
use crate::errors::{FetchError, QuoteError};
use crate::http::{cache_key, CacheTtls, HttpRequest, ResilientFetcher, TtlCache};

pub const LIFI_API: &str = "https://li.quest";

/// Gas units assumed for one DEX swap when estimating from gas prices
pub const DEFAULT_SWAP_GAS_LIMIT: u64 = 100_000;

/// Decimal supports at most 28 fractional digits
const MAX_DECIMALS: u8 = 28;

// ---------------------------------------------------------------------------
// Public quote types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct QuoteRequest {
    pub from_chain: u64,
    pub to_chain: u64,
    pub from_token: String,
    pub to_token: String,
    /// Raw integer amount in source-token base units
    pub from_amount: String,
    pub from_address: String,
}

/// One itemized cost in USD
#[derive(Debug, Clone, PartialEq)]
pub struct ItemizedCost {
    /// Fee name, or the step tool for step-level fees
    pub name: String,
    pub chain_id: Option<u64>,
    pub amount_usd: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrossChainQuote {
    /// Raw integer output amount in destination-token base units
    pub to_amount: String,
    pub to_decimals: Option<u8>,
    pub tool: Option<String>,
    pub gas_costs: Vec<ItemizedCost>,
    pub fee_costs: Vec<ItemizedCost>,
    /// Fees reported on individual route steps, named by step tool
    pub step_fees: Vec<ItemizedCost>,
}

/// Cross-chain quote aggregator seam.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn quote(&self, request: &QuoteRequest) -> Result<CrossChainQuote, QuoteError>;

    /// Authoritative token decimals, when the aggregator knows the token.
    async fn token_decimals(&self, chain_id: u64, address: &str) -> Option<u8>;

    /// Rough USD cost of one swap on `chain_id` from current gas prices.
    async fn gas_cost_usd(&self, chain_id: u64) -> Option<f64>;

    async fn supported_chains(&self) -> Option<Vec<u64>>;
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuote {
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    action: Option<RawAction>,
    #[serde(default)]
    estimate: Option<RawEstimate>,
    #[serde(default, alias = "steps")]
    included_steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAction {
    #[serde(default)]
    to_token: Option<RawToken>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEstimate {
    #[serde(default)]
    to_amount: Option<String>,
    #[serde(default)]
    gas_costs: Vec<RawCost>,
    #[serde(default)]
    fee_costs: Vec<RawCost>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCost {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    chain_id: Option<u64>,
    #[serde(default)]
    amount: Option<String>,
    #[serde(default, rename = "amountUSD", deserialize_with = "lenient_f64")]
    amount_usd: Option<f64>,
    #[serde(default)]
    token: Option<RawToken>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawToken {
    #[serde(default)]
    decimals: Option<u8>,
    #[serde(default)]
    chain_id: Option<u64>,
    #[serde(default, rename = "priceUSD", deserialize_with = "lenient_f64")]
    price_usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    estimate: Option<RawEstimate>,
}

#[derive(Debug, Deserialize)]
struct RawError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawChains {
    #[serde(default)]
    chains: Vec<RawChain>,
}

#[derive(Debug, Deserialize)]
struct RawChain {
    id: u64,
}

impl RawCost {
    /// USD value: `amountUSD` when present, else raw amount × token price.
    fn usd(&self) -> Option<f64> {
        if let Some(usd) = self.amount_usd {
            return Some(usd);
        }
        let token = self.token.as_ref()?;
        let units = raw_to_units(self.amount.as_deref()?, token.decimals.unwrap_or(18))?;
        Some(units * token.price_usd?)
    }

    fn itemize(&self, name: &str) -> Option<ItemizedCost> {
        Some(ItemizedCost {
            name: name.to_string(),
            chain_id: self
                .chain_id
                .or_else(|| self.token.as_ref().and_then(|t| t.chain_id)),
            amount_usd: self.usd()?,
        })
    }
}

impl RawQuote {
    fn into_quote(self) -> Result<CrossChainQuote, QuoteError> {
        let estimate = self
            .estimate
            .ok_or_else(|| QuoteError::Malformed("missing estimate".into()))?;
        let to_amount = estimate
            .to_amount
            .clone()
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| QuoteError::Malformed("missing estimate.toAmount".into()))?;

        let gas_costs = estimate
            .gas_costs
            .iter()
            .filter_map(|c| c.itemize(c.name.as_deref().unwrap_or("gas")))
            .collect();
        let fee_costs = estimate
            .fee_costs
            .iter()
            .filter_map(|c| c.itemize(c.name.as_deref().unwrap_or("fee")))
            .collect();
        let step_fees = self
            .included_steps
            .iter()
            .flat_map(|step| {
                let tool = step.tool.clone().unwrap_or_default();
                step.estimate
                    .iter()
                    .flat_map(|e| e.fee_costs.iter())
                    .filter_map(move |c| c.itemize(&tool))
                    .collect::<Vec<_>>()
            })
            .collect();

        Ok(CrossChainQuote {
            to_amount,
            to_decimals: self.action.and_then(|a| a.to_token).and_then(|t| t.decimals),
            tool: self.tool,
            gas_costs,
            fee_costs,
            step_fees,
        })
    }
}

// ---------------------------------------------------------------------------
// Amount conversion
// ---------------------------------------------------------------------------

fn pow10(decimals: u8) -> Option<Decimal> {
    if decimals > MAX_DECIMALS {
        return None;
    }
    Some(Decimal::from_i128_with_scale(10i128.pow(u32::from(decimals)), 0))
}

/// Raw integer string → token units.
pub fn raw_to_units(raw: &str, decimals: u8) -> Option<f64> {
    let raw = Decimal::from_str(raw.trim()).ok()?;
    raw.checked_div(pow10(decimals)?)?.to_f64()
}

/// Token units → raw integer string (truncated).
pub fn units_to_raw(units: f64, decimals: u8) -> Option<String> {
    if !units.is_finite() || units < 0.0 {
        return None;
    }
    let scaled = Decimal::from_f64(units)?.checked_mul(pow10(decimals)?)?;
    Some(scaled.trunc().normalize().to_string())
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct LifiClient {
    fetcher: Arc<ResilientFetcher>,
    base_url: String,
    api_key: Option<String>,
    native_token_usd: f64,
    gas_limit: u64,
    ttls: CacheTtls,
    decimals: TtlCache<u8>,
    gas: TtlCache<f64>,
    chains: TtlCache<Vec<u64>>,
}

impl LifiClient {
    pub fn new(fetcher: Arc<ResilientFetcher>, ttls: CacheTtls) -> Self {
        Self {
            fetcher,
            base_url: LIFI_API.to_string(),
            api_key: None,
            native_token_usd: 2500.0,
            gas_limit: DEFAULT_SWAP_GAS_LIMIT,
            ttls,
            decimals: TtlCache::new(),
            gas: TtlCache::new(),
            chains: TtlCache::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    /// Native token USD price used to convert gas prices (no per-chain oracle).
    pub fn with_native_token_usd(mut self, usd: f64) -> Self {
        self.native_token_usd = usd;
        self
    }

    fn request(&self, path: &str) -> HttpRequest {
        let request = HttpRequest::get(format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => request.header("x-lifi-api-key", key),
            None => request,
        }
    }

    async fn fetch_decimals(&self, chain_id: u64, address: &str) -> Result<u8, FetchError> {
        #[derive(Deserialize)]
        struct TokenInfo {
            decimals: Option<u8>,
        }
        let request = self
            .request("/v1/token")
            .query("chain", chain_id)
            .query("token", address);
        let info: TokenInfo = self.fetcher.fetch_json(&request).await?;
        info.decimals
            .ok_or_else(|| FetchError::NoData(format!("no decimals for {}", address)))
    }

    async fn fetch_gas_cost(&self, chain_id: u64) -> Result<f64, FetchError> {
        let request = self.request("/v1/gas/prices").query("chainId", chain_id);
        let body: serde_json::Value = self.fetcher.fetch_json(&request).await?;

        // Either {"fast": ..} for the requested chain, or a map keyed by chain id
        let entry = body
            .get(chain_id.to_string())
            .unwrap_or(&body);
        let fast_gwei = entry
            .get("fast")
            .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .filter(|g| *g > 0.0)
            .ok_or_else(|| FetchError::NoData(format!("no fast gas price for chain {}", chain_id)))?;

        Ok(self.gas_limit as f64 * fast_gwei / 1e9 * self.native_token_usd)
    }

    async fn fetch_chains(&self) -> Result<Vec<u64>, FetchError> {
        let body: RawChains = self.fetcher.fetch_json(&self.request("/v1/chains")).await?;
        let mut ids: Vec<u64> = body.chains.into_iter().map(|c| c.id).collect();
        ids.sort_unstable();
        if ids.is_empty() {
            return Err(FetchError::NoData("empty chain list".into()));
        }
        Ok(ids)
    }
}

fn rejection(status: u16, body: &str) -> QuoteError {
    match serde_json::from_str::<RawError>(body) {
        Ok(err) => QuoteError::Rejected {
            status,
            code: err.code,
            message: err.message.unwrap_or_else(|| truncate(body, 200)),
        },
        Err(_) => QuoteError::Rejected {
            status,
            code: None,
            message: truncate(body, 200),
        },
    }
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[async_trait]
impl QuoteSource for LifiClient {
    async fn quote(&self, request: &QuoteRequest) -> Result<CrossChainQuote, QuoteError> {
        let http = self
            .request("/v1/quote")
            .query("fromChain", request.from_chain)
            .query("toChain", request.to_chain)
            .query("fromToken", &request.from_token)
            .query("toToken", &request.to_token)
            .query("fromAmount", &request.from_amount)
            .query("fromAddress", &request.from_address);

        let response = match self.fetcher.fetch(&http).await {
            Ok(response) => response,
            Err(FetchError::Status { status, body }) => return Err(rejection(status, &body)),
            Err(e) => return Err(QuoteError::Fetch(e)),
        };

        let raw: RawQuote = serde_json::from_str(&response.body)
            .map_err(|e| QuoteError::Malformed(e.to_string()))?;
        let quote = raw.into_quote()?;
        debug!(
            "LI.FI quote {}→{}: toAmount={} via {:?}",
            request.from_chain, request.to_chain, quote.to_amount, quote.tool
        );
        Ok(quote)
    }

    async fn token_decimals(&self, chain_id: u64, address: &str) -> Option<u8> {
        let id = chain_id.to_string();
        let addr = address.to_lowercase();
        let key = cache_key("token_decimals", &[&id, &addr]);
        match self
            .decimals
            .get_or_fetch(&key, self.ttls.token_metadata, || self.fetch_decimals(chain_id, address))
            .await
        {
            Ok(decimals) => Some(decimals),
            Err(e) => {
                debug!("Token metadata unavailable for {} on {}: {}", address, chain_id, e);
                None
            }
        }
    }

    async fn gas_cost_usd(&self, chain_id: u64) -> Option<f64> {
        let id = chain_id.to_string();
        let key = cache_key("gas_cost_usd", &[&id]);
        self.gas
            .get_or_fetch(&key, self.ttls.gas, || self.fetch_gas_cost(chain_id))
            .await
            .map_err(|e| debug!("Gas price unavailable for chain {}: {}", chain_id, e))
            .ok()
    }

    async fn supported_chains(&self) -> Option<Vec<u64>> {
        let key = cache_key("supported_chains", &[]);
        match self
            .chains
            .get_or_fetch(&key, self.ttls.token_metadata, || self.fetch_chains())
            .await
        {
            Ok(ids) => Some(ids),
            Err(e) => {
                warn!("LI.FI chain list unavailable: {}", e);
                None
            }
        }
    }
}
