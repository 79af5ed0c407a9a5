//! Chain Registry and Token Metadata Heuristics
//!
//! Maps DexScreener chain slugs to EVM network ids (used by the cross-chain
//! quote aggregator), and holds the static stablecoin symbol tables.

/// DexScreener chain slug → EVM chain id
pub const CHAIN_IDS: &[(&str, u64)] = &[
    ("ethereum", 1),
    ("bsc", 56),
    ("polygon", 137),
    ("arbitrum", 42161),
    ("optimism", 10),
    ("base", 8453),
    ("avalanche", 43114),
    ("hyperevm", 998),
    ("zksync", 324),
    ("linea", 59144),
    ("scroll", 534352),
    ("mantle", 5000),
    ("blast", 81457),
    ("mode", 34443),
];

/// Token decimals for symbols that do not use 18
pub const TOKEN_DECIMALS: &[(&str, u8)] = &[
    ("USDT", 6),
    ("USDC", 6),
    ("USDT.E", 6),
    ("USDC.E", 6),
];

/// Decimals assumed when neither metadata nor the table above knows the token
pub const DEFAULT_DECIMALS: u8 = 18;

/// Recognized stablecoin symbols (uppercase). Used to pick the monitored side of a pool.
pub const STABLE_SYMBOLS: &[&str] = &[
    "USDT", "USDC", "BUSD", "TUSD", "USDP", "GUSD", "PYUSD", "FDUSD", "DAI", "FRAX", "LUSD",
    "GHO", "CRVUSD", "MIM", "SUSD", "DOLA", "MAI", "USD0", "USDD", "USDE",
];

pub fn chain_id(slug: &str) -> Option<u64> {
    let slug = slug.trim().to_lowercase();
    CHAIN_IDS
        .iter()
        .find(|(name, _)| *name == slug)
        .map(|(_, id)| *id)
}

pub fn chain_slug(id: u64) -> Option<&'static str> {
    CHAIN_IDS
        .iter()
        .find(|(_, chain_id)| *chain_id == id)
        .map(|(name, _)| *name)
}

/// Last-resort decimals guess from the ticker.
pub fn guess_decimals(symbol: &str) -> u8 {
    let symbol = symbol.trim().to_uppercase();
    TOKEN_DECIMALS
        .iter()
        .find(|(s, _)| *s == symbol)
        .map(|(_, d)| *d)
        .unwrap_or(DEFAULT_DECIMALS)
}

pub fn is_stable_symbol(symbol: &str) -> bool {
    let symbol = symbol.trim().to_uppercase();
    STABLE_SYMBOLS.contains(&symbol.as_str())
}
