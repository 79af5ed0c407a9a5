//! Quote Refinement Chain
//!
//! Replaces the heuristic cost components of a candidate with numbers from a
//! live cross-chain quote when one can be obtained:
//!
//! 1. Preconditions (known chains, token addresses, distinct chains/tokens,
//!    positive prices, funding address). Each failure has its own reason.
//! 2. Quote for `trade_size / cheap_price` source tokens.
//! 3. Itemized gas and fee costs override the estimates (tagged `quote`).
//!    Gas the quote left out comes from current gas prices (`gas-oracle`).
//! 4. Output shortfall not explained by itemized costs becomes slippage.
//!
//! Anything going wrong leaves the base detail intact apart from `skip_reason`.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::cost::{margin, CostComponent, CostDetail, CostSource};
use crate::chains::{chain_id, guess_decimals};
use crate::errors::QuoteError;
use crate::oracle::lifi::{raw_to_units, units_to_raw};
use crate::oracle::{CrossChainQuote, QuoteRequest, QuoteSource};
use crate::types::PriceRecord;

pub const REFINEMENT_SOURCE: &str = "li.fi quote";

/// Minimum plausible length of a funding address
const MIN_FROM_ADDRESS_LEN: usize = 10;

/// Chain ids listed when the aggregator rejects a chain
const MAX_LISTED_CHAINS: usize = 20;

/// Why a candidate kept its heuristic costs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    UnknownChain { chain: String },
    MissingTokenAddress { chain: String },
    SameChain { chain: String },
    SameToken { address: String },
    InvalidPrice,
    NoFundingAddress,
    AmountEncoding,
    UnsupportedRoute { message: String },
    UnsupportedChain {
        chain_id: Option<u64>,
        supported: Vec<u64>,
        message: String,
    },
    SameTokenRejected { message: String },
    Rejected {
        status: u16,
        code: Option<i64>,
        message: String,
    },
    Request(String),
    Malformed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SkipReason::UnknownChain { chain } => write!(f, "chain '{}' has no known network id", chain),
            SkipReason::MissingTokenAddress { chain } => write!(f, "token address unknown on {}", chain),
            SkipReason::SameChain { chain } => write!(f, "both sides on {}, no bridge needed", chain),
            SkipReason::SameToken { address } => write!(f, "source and destination token are both {}", address),
            SkipReason::InvalidPrice => write!(f, "non-positive price"),
            SkipReason::NoFundingAddress => write!(f, "no funding address configured for quotes"),
            SkipReason::AmountEncoding => write!(f, "trade size cannot be encoded in token base units"),
            SkipReason::UnsupportedRoute { message } => write!(f, "route not supported: {}", message),
            SkipReason::UnsupportedChain { chain_id, supported, message } => {
                match chain_id {
                    Some(id) => write!(f, "chain {} rejected by aggregator", id)?,
                    None => write!(f, "chain pair rejected by aggregator")?,
                }
                if !supported.is_empty() {
                    let ids: Vec<String> = supported
                        .iter()
                        .take(MAX_LISTED_CHAINS)
                        .map(|id| id.to_string())
                        .collect();
                    write!(f, " (supported: {})", ids.join(", "))?;
                }
                write!(f, ": {}", message)
            }
            SkipReason::SameTokenRejected { message } => write!(f, "same token rejected: {}", message),
            SkipReason::Rejected { status, code, message } => match code {
                Some(code) => write!(f, "quote rejected (HTTP {}, code {}): {}", status, code, message),
                None => write!(f, "quote rejected (HTTP {}): {}", status, message),
            },
            SkipReason::Request(e) => write!(f, "quote request failed: {}", e),
            SkipReason::Malformed(e) => write!(f, "unusable quote: {}", e),
        }
    }
}

/// Refines base cost estimates with live aggregator quotes.
pub struct QuoteRefiner {
    source: Arc<dyn QuoteSource>,
    from_address: Option<String>,
}

/// Validated inputs for one quote
struct Route<'a> {
    src_id: u64,
    dst_id: u64,
    src_token: &'a str,
    dst_token: &'a str,
    src_price: f64,
    dst_price: f64,
    from_address: &'a str,
}

impl QuoteRefiner {
    pub fn new(source: Arc<dyn QuoteSource>, from_address: Option<String>) -> Self {
        Self {
            source,
            from_address: from_address.map(|a| a.trim().to_string()),
        }
    }

    /// Refine `base` for buying on `cheap` and selling on `rich`.
    pub async fn refine(&self, cheap: &PriceRecord, rich: &PriceRecord, base: CostDetail) -> CostDetail {
        let route = match self.route(cheap, rich) {
            Ok(route) => route,
            Err(reason) => return skipped(base, reason, cheap, rich),
        };

        let src_decimals = self.decimals(route.src_id, route.src_token, &cheap.asset_name).await;
        let dst_decimals = self.decimals(route.dst_id, route.dst_token, &rich.asset_name).await;

        let from_amount = match units_to_raw(base.trade_size_usd / route.src_price, src_decimals) {
            Some(amount) => amount,
            None => return skipped(base, SkipReason::AmountEncoding, cheap, rich),
        };

        let request = QuoteRequest {
            from_chain: route.src_id,
            to_chain: route.dst_id,
            from_token: route.src_token.to_string(),
            to_token: route.dst_token.to_string(),
            from_amount,
            from_address: route.from_address.to_string(),
        };

        let quote = match self.source.quote(&request).await {
            Ok(quote) => quote,
            Err(e) => {
                let reason = self.classify(e, &route).await;
                return skipped(base, reason, cheap, rich);
            }
        };

        let received = match raw_to_units(&quote.to_amount, quote.to_decimals.unwrap_or(dst_decimals)) {
            Some(received) => received,
            None => {
                let reason = SkipReason::Malformed(format!("toAmount '{}'", quote.to_amount));
                return skipped(base, reason, cheap, rich);
            }
        };

        let refined = self.apply_quote(&route, &quote, received, base).await;
        info!(
            "🔎 Refined {} {}→{}: received {:.4}, net ${:.2} ({:.2}%)",
            cheap.asset_name,
            cheap.chain,
            rich.chain,
            received,
            refined.net_profit,
            refined.net_margin
        );
        refined
    }

    fn route<'a>(&'a self, cheap: &'a PriceRecord, rich: &'a PriceRecord) -> Result<Route<'a>, SkipReason> {
        // 1. Network ids
        let src_id = chain_id(&cheap.chain).ok_or_else(|| SkipReason::UnknownChain {
            chain: cheap.chain.clone(),
        })?;
        let dst_id = chain_id(&rich.chain).ok_or_else(|| SkipReason::UnknownChain {
            chain: rich.chain.clone(),
        })?;

        // 2. Token addresses
        let src_token = cheap.token_address.trim();
        if src_token.is_empty() {
            return Err(SkipReason::MissingTokenAddress { chain: cheap.chain.clone() });
        }
        let dst_token = rich.token_address.trim();
        if dst_token.is_empty() {
            return Err(SkipReason::MissingTokenAddress { chain: rich.chain.clone() });
        }

        // 3. Distinct chains
        if src_id == dst_id {
            return Err(SkipReason::SameChain { chain: cheap.chain.clone() });
        }

        // 4. Distinct tokens
        if src_token.eq_ignore_ascii_case(dst_token) {
            return Err(SkipReason::SameToken { address: src_token.to_lowercase() });
        }

        // 5. Prices
        if cheap.price_usd <= 0.0 || rich.price_usd <= 0.0 {
            return Err(SkipReason::InvalidPrice);
        }

        // 6. Funding address
        let from_address = self
            .from_address
            .as_deref()
            .filter(|a| a.len() >= MIN_FROM_ADDRESS_LEN)
            .ok_or(SkipReason::NoFundingAddress)?;

        Ok(Route {
            src_id,
            dst_id,
            src_token,
            dst_token,
            src_price: cheap.price_usd,
            dst_price: rich.price_usd,
            from_address,
        })
    }

    /// Metadata lookup first, symbol heuristic last.
    async fn decimals(&self, chain_id: u64, address: &str, symbol: &str) -> u8 {
        match self.source.token_decimals(chain_id, address).await {
            Some(decimals) => decimals,
            None => {
                let guess = guess_decimals(symbol);
                debug!("Guessing {} decimals for {} on chain {}", guess, symbol, chain_id);
                guess
            }
        }
    }

    async fn classify(&self, err: QuoteError, route: &Route<'_>) -> SkipReason {
        match err {
            QuoteError::Rejected { status, code, message } => {
                let lower = message.to_lowercase();
                if lower.contains("not supported") || lower.contains("unsupported") {
                    SkipReason::UnsupportedRoute { message }
                } else if lower.contains("must be equal to one of the allowed values")
                    || lower.contains("must match exactly one schema")
                {
                    let chain_id = if message.contains("/toChain") {
                        Some(route.dst_id)
                    } else if message.contains("/fromChain") {
                        Some(route.src_id)
                    } else {
                        None
                    };
                    SkipReason::UnsupportedChain {
                        chain_id,
                        supported: self.source.supported_chains().await.unwrap_or_default(),
                        message,
                    }
                } else if code == Some(1011) {
                    SkipReason::SameTokenRejected { message }
                } else {
                    SkipReason::Rejected { status, code, message }
                }
            }
            QuoteError::Fetch(e) => SkipReason::Request(e.to_string()),
            QuoteError::Malformed(e) => SkipReason::Malformed(e),
        }
    }

    async fn apply_quote(
        &self,
        route: &Route<'_>,
        quote: &CrossChainQuote,
        received: f64,
        base: CostDetail,
    ) -> CostDetail {
        let trade_size = base.trade_size_usd;
        let revenue = received * route.dst_price;
        let real_profit = revenue - trade_size;
        let theoretical_out_usd = trade_size / route.src_price * route.dst_price;

        let mut detail = base;
        detail.skip_reason = None;

        // Gas itemized per chain; unattributed gas is paid on the source chain
        let mut src_gas = None;
        let mut dst_gas = None;
        for cost in &quote.gas_costs {
            let slot = match cost.chain_id {
                Some(id) if id == route.dst_id => &mut dst_gas,
                Some(id) if id != route.src_id => continue,
                _ => &mut src_gas,
            };
            *slot = Some(slot.unwrap_or(0.0) + cost.amount_usd);
        }

        // Fees: bridge-like names vs everything else
        let mut bridge = None;
        let mut other = None;
        for fee in &quote.fee_costs {
            let name = fee.name.to_lowercase();
            let slot = if ["bridge", "cross", "transfer"].iter().any(|k| name.contains(k)) {
                &mut bridge
            } else {
                &mut other
            };
            *slot = Some(slot.unwrap_or(0.0) + fee.amount_usd);
        }
        if bridge.is_none() {
            for fee in quote
                .step_fees
                .iter()
                .filter(|f| f.name.to_lowercase().contains("bridge"))
            {
                bridge = Some(bridge.unwrap_or(0.0) + fee.amount_usd);
            }
        }

        if let Some(usd) = src_gas {
            detail.src_gas = CostComponent::with_source(usd, CostSource::Quote);
        } else if let Some(usd) = self.source.gas_cost_usd(route.src_id).await {
            detail.src_gas = CostComponent::with_source(usd, CostSource::GasOracle);
        }
        if let Some(usd) = dst_gas {
            detail.dst_gas = CostComponent::with_source(usd, CostSource::Quote);
        } else if let Some(usd) = self.source.gas_cost_usd(route.dst_id).await {
            detail.dst_gas = CostComponent::with_source(usd, CostSource::GasOracle);
        }
        if let Some(usd) = bridge {
            detail.bridge_fee = CostComponent::with_source(usd, CostSource::Quote);
        }
        if let Some(usd) = other.filter(|usd| *usd > 0.0) {
            detail.other_fees = CostComponent::with_source(usd, CostSource::Quote);
        }

        // Output shortfall minus itemized costs is market impact
        let shortfall = theoretical_out_usd - revenue;
        if shortfall > 0.0 {
            let known: f64 = [detail.src_gas, detail.dst_gas, detail.bridge_fee, detail.other_fees]
                .iter()
                .filter(|c| c.is_overridden())
                .map(|c| c.usd)
                .sum();
            let pure_slippage = (shortfall - known).max(0.0);
            if pure_slippage > 0.0 {
                detail.slippage_loss = CostComponent::with_source(pure_slippage, CostSource::Quote);
                detail.slippage_pct = pure_slippage / theoretical_out_usd * 100.0;
            }
        }

        if detail.has_overrides() {
            detail.recompute_from_components();
        } else {
            detail.total_cost = shortfall;
            detail.net_profit = real_profit;
            detail.net_margin = margin(real_profit, trade_size);
        }

        detail.received_amount = Some(received);
        detail.refinement_source = Some(REFINEMENT_SOURCE.to_string());
        detail
    }
}

fn skipped(mut base: CostDetail, reason: SkipReason, cheap: &PriceRecord, rich: &PriceRecord) -> CostDetail {
    match reason {
        SkipReason::Request(_) | SkipReason::Malformed(_) | SkipReason::Rejected { .. } => warn!(
            "Quote refinement failed for {} {}→{}: {}",
            cheap.asset_name, cheap.chain, rich.chain, reason
        ),
        _ => debug!(
            "Quote refinement skipped for {} {}→{}: {}",
            cheap.asset_name, cheap.chain, rich.chain, reason
        ),
    }
    base.skip_reason = Some(reason);
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::cost::{estimate_cost, CostParams};
    use crate::errors::FetchError;
    use crate::oracle::ItemizedCost;
    use crate::types::{PriceSource, RiskLevel};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const FROM: &str = "0x1111111111111111111111111111111111111111";

    #[derive(Default)]
    struct FakeQuotes {
        response: Mutex<Option<Result<CrossChainQuote, QuoteError>>>,
        requests: Mutex<Vec<QuoteRequest>>,
        decimals: HashMap<u64, u8>,
        gas: HashMap<u64, f64>,
        chains: Option<Vec<u64>>,
        quote_calls: AtomicUsize,
    }

    impl FakeQuotes {
        fn answering(response: Result<CrossChainQuote, QuoteError>) -> Self {
            Self {
                response: Mutex::new(Some(response)),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl QuoteSource for FakeQuotes {
        async fn quote(&self, request: &QuoteRequest) -> Result<CrossChainQuote, QuoteError> {
            self.quote_calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            self.response
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(QuoteError::Malformed("no scripted quote".into())))
        }

        async fn token_decimals(&self, chain_id: u64, _address: &str) -> Option<u8> {
            self.decimals.get(&chain_id).copied()
        }

        async fn gas_cost_usd(&self, chain_id: u64) -> Option<f64> {
            self.gas.get(&chain_id).copied()
        }

        async fn supported_chains(&self) -> Option<Vec<u64>> {
            self.chains.clone()
        }
    }

    fn record(asset: &str, chain: &str, price: f64, address: &str) -> PriceRecord {
        PriceRecord {
            asset_name: asset.into(),
            chain: chain.into(),
            price_usd: price,
            deviation_pct: 0.0,
            threshold: 0.5,
            is_alert: false,
            token_address: address.into(),
            counter_asset_name: None,
            pool_exchange_rate: None,
            liquidity_usd: Some(1_000_000.0),
            venue: None,
            price_source: PriceSource::TokenEndpoint,
            risk: RiskLevel::Safe,
        }
    }

    fn cheap() -> PriceRecord {
        record("USDT", "bsc", 0.99, "0x55d398326f99059ff775485246999027b3197955")
    }

    fn rich() -> PriceRecord {
        record("USDC", "base", 1.01, "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913")
    }

    fn base_detail() -> CostDetail {
        estimate_cost(5000.0, 0.99, 1.01, &CostParams::default())
    }

    fn quote(to_amount: &str) -> CrossChainQuote {
        CrossChainQuote {
            to_amount: to_amount.into(),
            to_decimals: Some(6),
            tool: Some("stargate".into()),
            gas_costs: vec![],
            fee_costs: vec![],
            step_fees: vec![],
        }
    }

    fn cost(name: &str, chain_id: Option<u64>, usd: f64) -> ItemizedCost {
        ItemizedCost {
            name: name.into(),
            chain_id,
            amount_usd: usd,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[tokio::test]
    async fn test_same_chain_skipped_without_quote() {
        let fake = Arc::new(FakeQuotes::default());
        let refiner = QuoteRefiner::new(fake.clone(), Some(FROM.into()));
        let other = record("USDC", "bsc", 1.01, "0x8ac76a51cc950d9822d68b83fe1ad97b32cd580d");

        let base = base_detail();
        let out = refiner.refine(&cheap(), &other, base.clone()).await;

        assert_eq!(out.skip_reason, Some(SkipReason::SameChain { chain: "bsc".into() }));
        assert_eq!(out.net_profit, base.net_profit);
        assert!(!out.is_refined());
        assert_eq!(fake.quote_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_preconditions_have_distinct_reasons() {
        let refiner = QuoteRefiner::new(Arc::new(FakeQuotes::default()), Some(FROM.into()));

        let unknown = record("USDC", "narnia", 1.01, "0xabc");
        let out = refiner.refine(&cheap(), &unknown, base_detail()).await;
        assert_eq!(out.skip_reason, Some(SkipReason::UnknownChain { chain: "narnia".into() }));

        let no_addr = record("USDC", "base", 1.01, "");
        let out = refiner.refine(&cheap(), &no_addr, base_detail()).await;
        assert_eq!(out.skip_reason, Some(SkipReason::MissingTokenAddress { chain: "base".into() }));

        let same_token = record("USDT", "base", 1.01, "0x55D398326F99059FF775485246999027B3197955");
        let out = refiner.refine(&cheap(), &same_token, base_detail()).await;
        assert!(matches!(out.skip_reason, Some(SkipReason::SameToken { .. })));

        let zero = record("USDC", "base", 0.0, "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913");
        let out = refiner.refine(&cheap(), &zero, base_detail()).await;
        assert_eq!(out.skip_reason, Some(SkipReason::InvalidPrice));
    }

    #[tokio::test]
    async fn test_missing_funding_address() {
        let fake = Arc::new(FakeQuotes::default());
        let refiner = QuoteRefiner::new(fake.clone(), Some("0x123".into()));
        let out = refiner.refine(&cheap(), &rich(), base_detail()).await;
        assert_eq!(out.skip_reason, Some(SkipReason::NoFundingAddress));

        let refiner = QuoteRefiner::new(fake.clone(), None);
        let out = refiner.refine(&cheap(), &rich(), base_detail()).await;
        assert_eq!(out.skip_reason, Some(SkipReason::NoFundingAddress));
        assert_eq!(fake.quote_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_quote_overrides_tagged_by_source() {
        let mut q = quote("5050000000");
        q.gas_costs = vec![cost("SEND", Some(56), 0.2)];
        q.fee_costs = vec![cost("Bridge Fee", Some(8453), 0.1), cost("Integrator Fee", None, 0.05)];

        let mut fake = FakeQuotes::answering(Ok(q));
        fake.decimals.insert(56, 18);
        fake.gas.insert(8453, 0.05);
        let fake = Arc::new(fake);
        let refiner = QuoteRefiner::new(fake.clone(), Some(FROM.into()));

        let out = refiner.refine(&cheap(), &rich(), base_detail()).await;

        assert_eq!(out.skip_reason, None);
        assert_eq!(out.refinement_source.as_deref(), Some(REFINEMENT_SOURCE));
        assert_eq!(out.received_amount, Some(5050.0));

        assert_eq!(out.src_gas, CostComponent::with_source(0.2, CostSource::Quote));
        assert_eq!(out.dst_gas, CostComponent::with_source(0.05, CostSource::GasOracle));
        assert_eq!(out.bridge_fee.source, CostSource::Quote);
        assert!(close(out.bridge_fee.usd, 0.1));
        assert!(close(out.other_fees.usd, 0.05));

        // theoretical out 5101.0101, revenue 5100.5, itemized 0.4
        let theoretical_out = 5000.0 / 0.99 * 1.01;
        let shortfall = theoretical_out - 5100.5;
        assert_eq!(out.slippage_loss.source, CostSource::Quote);
        assert!(close(out.slippage_loss.usd, shortfall - 0.4));
        assert!(close(out.slippage_pct, (shortfall - 0.4) / theoretical_out * 100.0));

        assert!(close(out.total_cost, shortfall));
        assert!(close(out.net_profit, out.theoretical_profit - out.total_cost));
        assert!(close(out.net_margin, out.net_profit / 5000.0 * 100.0));
        assert_eq!(out.break_even_size, base_detail().break_even_size);

        let req = &fake.requests.lock().unwrap()[0];
        assert_eq!((req.from_chain, req.to_chain), (56, 8453));
        assert!(req.from_amount.starts_with("50505050505050"));
        assert_eq!(req.from_amount.len(), 22);
    }

    #[tokio::test]
    async fn test_quote_without_overrides_uses_real_profit() {
        // Revenue above theoretical output: no slippage, no itemized costs
        let fake = Arc::new(FakeQuotes::answering(Ok(quote("5060000000"))));
        let refiner = QuoteRefiner::new(fake, Some(FROM.into()));

        let out = refiner.refine(&cheap(), &rich(), base_detail()).await;
        let real_profit = 5060.0 * 1.01 - 5000.0;
        assert!(close(out.net_profit, real_profit));
        assert!(!out.has_overrides());
        assert!(out.is_refined());
    }

    #[tokio::test]
    async fn test_decimals_fall_back_to_symbol_heuristic() {
        let fake = Arc::new(FakeQuotes::answering(Ok(quote("5050000000"))));
        let refiner = QuoteRefiner::new(fake.clone(), Some(FROM.into()));
        refiner.refine(&cheap(), &rich(), base_detail()).await;

        // USDT guessed at 6 decimals: 5050.50505 → 5050505050
        let req = &fake.requests.lock().unwrap()[0];
        assert_eq!(req.from_amount, "5050505050");
    }

    #[tokio::test]
    async fn test_rejections_classified() {
        let rejected = |message: &str, code: Option<i64>| {
            Err(QuoteError::Rejected {
                status: 400,
                code,
                message: message.into(),
            })
        };

        let refiner = QuoteRefiner::new(
            Arc::new(FakeQuotes::answering(rejected("Chain pair is not supported", Some(1002)))),
            Some(FROM.into()),
        );
        let out = refiner.refine(&cheap(), &rich(), base_detail()).await;
        assert!(matches!(out.skip_reason, Some(SkipReason::UnsupportedRoute { .. })));

        let mut fake = FakeQuotes::answering(rejected(
            "/toChain must be equal to one of the allowed values",
            None,
        ));
        fake.chains = Some(vec![1, 10, 56]);
        let refiner = QuoteRefiner::new(Arc::new(fake), Some(FROM.into()));
        let out = refiner.refine(&cheap(), &rich(), base_detail()).await;
        match out.skip_reason {
            Some(SkipReason::UnsupportedChain { chain_id, supported, .. }) => {
                assert_eq!(chain_id, Some(8453));
                assert_eq!(supported, vec![1, 10, 56]);
            }
            other => panic!("unexpected {:?}", other),
        }

        let refiner = QuoteRefiner::new(
            Arc::new(FakeQuotes::answering(rejected("The same token was requested", Some(1011)))),
            Some(FROM.into()),
        );
        let out = refiner.refine(&cheap(), &rich(), base_detail()).await;
        assert!(matches!(out.skip_reason, Some(SkipReason::SameTokenRejected { .. })));
    }

    #[tokio::test]
    async fn test_request_failure_keeps_base_numbers() {
        let fake = FakeQuotes::answering(Err(QuoteError::Fetch(FetchError::Timeout("10s".into()))));
        let refiner = QuoteRefiner::new(Arc::new(fake), Some(FROM.into()));

        let base = base_detail();
        let out = refiner.refine(&cheap(), &rich(), base.clone()).await;
        assert!(matches!(out.skip_reason, Some(SkipReason::Request(_))));
        assert_eq!(
            CostDetail { skip_reason: None, ..out },
            base
        );
    }

    #[test]
    fn test_unsupported_chain_message_lists_ids() {
        let reason = SkipReason::UnsupportedChain {
            chain_id: Some(998),
            supported: vec![1, 56],
            message: "bad".into(),
        };
        assert_eq!(reason.to_string(), "chain 998 rejected by aggregator (supported: 1, 56): bad");
    }
}
