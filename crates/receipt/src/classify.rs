//! Store classification over raw OCR text.
//!
//! Four passes, cheapest first: word-boundary alias hits, alias substrings,
//! vendor-specific signatures, then header-position guesses. Each pass can
//! short-circuit when its confidence clears the configured bar; otherwise the
//! best candidate seen so far is retained and later passes only replace it
//! with something stronger.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::config::PassBars;
use crate::re;
use crate::types::{MatchSource, StoreMatch};

/// One alias with its precompiled word-boundary pattern. The pattern is
/// `None` only if the escaped alias somehow failed to compile.
struct CompiledAlias {
    alias_lower: String,
    word_re: Option<Regex>,
}

impl CompiledAlias {
    fn new(alias: &str) -> Self {
        let alias_lower = alias.to_lowercase();
        let word_re = Regex::new(&format!(r"\b{}\b", regex::escape(&alias_lower))).ok();
        Self { alias_lower, word_re }
    }
}

struct StoreAliases {
    store_id: String,
    aliases: Vec<CompiledAlias>,
}

/// Classifies OCR text to a canonical store id.
///
/// The alias table is compiled once at construction; `classify` itself is
/// read-only and safe to share behind an `Arc`.
pub struct StoreClassifier {
    table: BTreeMap<String, Vec<String>>,
    stores: Vec<StoreAliases>,
    bars: PassBars,
    alias_path: Option<PathBuf>,
}

impl Default for StoreClassifier {
    fn default() -> Self {
        Self::new(default_alias_table())
    }
}

impl StoreClassifier {
    pub fn new(table: BTreeMap<String, Vec<String>>) -> Self {
        let stores = compile(&table);
        Self { table, stores, bars: PassBars::default(), alias_path: None }
    }

    pub fn with_bars(mut self, bars: PassBars) -> Self {
        self.bars = bars;
        self
    }

    /// Load the alias table from a TOML file. A missing file is created with
    /// the default table; later `add_alias` calls save back to the same path.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, String> {
        let path = path.into();
        let table = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|e| format!("read {}: {e}", path.display()))?;
            toml::from_str(&raw).map_err(|e| format!("parse {}: {e}", path.display()))?
        } else {
            let table = default_alias_table();
            save_table(&path, &table)?;
            tracing::info!(path = %path.display(), "created default store alias file");
            table
        };
        tracing::debug!(stores = table.len(), "loaded store aliases");
        let mut classifier = Self::new(table);
        classifier.alias_path = Some(path);
        Ok(classifier)
    }

    /// Register a new alias for a store, creating the store entry if needed,
    /// and persist the table when it was loaded from a file.
    pub fn add_alias(&mut self, store_id: &str, alias: &str) -> Result<(), String> {
        let alias = alias.trim();
        if alias.is_empty() {
            return Err("alias must not be empty".into());
        }
        let entry = self.table.entry(store_id.to_string()).or_default();
        if !entry.iter().any(|a| a.eq_ignore_ascii_case(alias)) {
            entry.push(alias.to_uppercase());
        }
        self.stores = compile(&self.table);
        if let Some(path) = &self.alias_path {
            save_table(path, &self.table)?;
        }
        tracing::debug!(store_id, alias, "added store alias");
        Ok(())
    }

    pub fn alias_table(&self) -> &BTreeMap<String, Vec<String>> {
        &self.table
    }

    /// Classify OCR text to a store id. Returns the unknown match rather
    /// than failing when nothing in the text is recognizable.
    pub fn classify(&self, text: &str) -> StoreMatch {
        if text.trim().is_empty() {
            return StoreMatch::unknown();
        }
        let clean_lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && l.chars().any(|c| c.is_ascii_alphabetic()))
            .collect();
        if clean_lines.is_empty() {
            return StoreMatch::unknown();
        }
        let lower = text.to_lowercase();
        let joined = clean_lines.join(" ").to_lowercase();

        let mut best = StoreMatch::unknown();

        if let Some(m) = self.alias_exact(&lower) {
            if m.confidence > self.bars.alias_bar {
                return m;
            }
            retain_best(&mut best, m);
        }
        if let Some(m) = self.alias_partial(&lower) {
            if m.confidence > self.bars.alias_bar {
                return m;
            }
            retain_best(&mut best, m);
        }
        if let Some(m) = vendor_signatures(text, &joined) {
            if m.confidence > self.bars.pattern_bar {
                return m;
            }
            retain_best(&mut best, m);
        }
        if let Some(m) = self.header_position(&clean_lines) {
            if m.confidence > self.bars.header_bar {
                return m;
            }
            retain_best(&mut best, m);
        }

        tracing::debug!(store_id = %best.store_id, confidence = best.confidence, "no pass cleared its bar");
        best
    }

    fn alias_exact(&self, lower: &str) -> Option<StoreMatch> {
        for store in &self.stores {
            for ca in &store.aliases {
                if ca.word_re.as_ref().is_some_and(|re| re.is_match(lower)) {
                    return Some(StoreMatch::new(
                        &store.store_id,
                        self.bars.alias_exact,
                        MatchSource::AliasExact,
                    ));
                }
            }
        }
        None
    }

    /// Substring hits score 0.7 plus a length bonus, so a longer alias found
    /// inside noisy text outranks a two-letter one.
    fn alias_partial(&self, lower: &str) -> Option<StoreMatch> {
        let mut best: Option<StoreMatch> = None;
        for store in &self.stores {
            for ca in &store.aliases {
                if lower.contains(&ca.alias_lower) {
                    let bonus = (ca.alias_lower.len() as f32 / 50.0).min(0.2);
                    let m = StoreMatch::new(
                        &store.store_id,
                        0.7 + bonus,
                        MatchSource::AliasPartial,
                    );
                    if best.as_ref().is_none_or(|b| m.confidence > b.confidence) {
                        best = Some(m);
                    }
                }
            }
        }
        best
    }

    fn header_position(&self, clean_lines: &[&str]) -> Option<StoreMatch> {
        let candidates = &clean_lines[..clean_lines.len().min(5)];
        for (idx, line) in candidates.iter().enumerate() {
            let decay = 1.0 - 0.1 * idx as f32;
            let line_lower = line.to_lowercase();
            for store in &self.stores {
                for ca in &store.aliases {
                    if line_lower.contains(&ca.alias_lower) {
                        return Some(StoreMatch::new(
                            &store.store_id,
                            0.75 * decay,
                            MatchSource::HeaderPosition,
                        ));
                    }
                }
            }
            for pattern in header_patterns() {
                let Some(caps) = pattern.captures(&line_lower) else { continue };
                let candidate = caps.get(1).map_or("", |m| m.as_str()).trim();
                if candidate.is_empty() {
                    continue;
                }
                for store in &self.stores {
                    for ca in &store.aliases {
                        if candidate.contains(&ca.alias_lower) {
                            return Some(StoreMatch::new(
                                &store.store_id,
                                0.7 * decay,
                                MatchSource::HeaderPosition,
                            ));
                        }
                    }
                }
                let name: String = candidate
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .chars()
                    .take(30)
                    .collect();
                if name.len() >= 3 {
                    return Some(StoreMatch::new(
                        name,
                        self.bars.header_guess * decay,
                        MatchSource::HeaderPosition,
                    ));
                }
            }
        }
        // Nothing structured in the header; a plausibly-sized first line is
        // still better than "unknown".
        let first = candidates[0];
        let len = first.chars().count();
        if (3..=30).contains(&len) {
            return Some(StoreMatch::new(
                first,
                self.bars.first_line_guess,
                MatchSource::HeaderPosition,
            ));
        }
        None
    }
}

fn retain_best(best: &mut StoreMatch, candidate: StoreMatch) {
    if candidate.confidence > best.confidence {
        *best = candidate;
    }
}

/// Fold a caller-supplied store hint into a classification result. A hint
/// consistent with a confident match reinforces it; a hint against a weak
/// match replaces it.
pub fn apply_store_hint(mut m: StoreMatch, hint: &str) -> StoreMatch {
    let hint = hint.trim();
    if hint.is_empty() {
        return m;
    }
    let hint_lower = hint.to_lowercase();
    if m.store_id.to_lowercase().contains(&hint_lower) && m.confidence > 0.5 {
        m.confidence = m.confidence.max(0.8);
    } else if m.confidence < 0.6 {
        m = StoreMatch::new(hint, 0.7, MatchSource::Hint);
    }
    m
}

fn compile(table: &BTreeMap<String, Vec<String>>) -> Vec<StoreAliases> {
    table
        .iter()
        .map(|(store_id, aliases)| StoreAliases {
            store_id: store_id.clone(),
            aliases: aliases.iter().map(|a| CompiledAlias::new(a)).collect(),
        })
        .collect()
}

fn save_table(path: &Path, table: &BTreeMap<String, Vec<String>>) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("create {}: {e}", parent.display()))?;
        }
    }
    let raw = toml::to_string(table).map_err(|e| format!("serialize aliases: {e}"))?;
    fs::write(path, raw).map_err(|e| format!("write {}: {e}", path.display()))
}

pub fn default_alias_table() -> BTreeMap<String, Vec<String>> {
    let entries: &[(&str, &[&str])] = &[
        ("costco", &["COSTCO", "COSTCO WHOLESALE", "WHOLESALE"]),
        ("trader_joes", &["TRADER JOE'S", "TRADER JOES", "TJ"]),
        ("h_mart", &["H MART", "H-MART"]),
        ("key_food", &["KEY FOOD", "KEYFOOD"]),
        ("walmart", &["WALMART", "WAL-MART", "WAL MART"]),
        ("target", &["TARGET", "SUPER TARGET"]),
        ("kroger", &["KROGER", "KROGER'S"]),
        ("safeway", &["SAFEWAY"]),
        ("publix", &["PUBLIX"]),
        ("whole_foods", &["WHOLE FOODS", "WHOLE FOODS MARKET"]),
        ("aldi", &["ALDI"]),
    ];
    entries
        .iter()
        .map(|(id, aliases)| {
            (id.to_string(), aliases.iter().map(|a| a.to_string()).collect())
        })
        .collect()
}

// ── Vendor signatures ───────────────────────────────────────────────────────

re!(costco_wholesale_bars, r"={2,}wholesale|wholesale={2,}");
re!(costco_member, r"(?:member|membership)\s*(?:number|#|no)?\s*\d{6,}");
re!(trader_joes_store_no, r"(?:store|tr)\s*#\s*\d{3}");
re!(hangul, r"[\u{AC00}-\u{D7A3}]");
re!(key_food_area, r"(?:queens|sunnyside|long\s*island\s*city|astoria|flushing)");
re!(walmart_slogan, r"save money\.?\s*live better");
re!(target_slogan, r"expect more\.?\s*pay less");

/// Chain-specific signatures that survive OCR even when the logo banner is
/// garbled: slogans, membership formats, store-number formats, Hangul script.
fn vendor_signatures(raw: &str, joined: &str) -> Option<StoreMatch> {
    let squeezed: String = joined.chars().filter(|c| !c.is_whitespace()).collect();
    if costco_wholesale_bars().is_match(&squeezed)
        || (joined.contains("===") && joined.contains("wholesale"))
    {
        return Some(StoreMatch::new("costco", 0.9, MatchSource::Pattern));
    }
    if costco_member().is_match(joined) {
        return Some(StoreMatch::new("costco", 0.85, MatchSource::Pattern));
    }
    if trader_joes_store_no().is_match(joined)
        && (joined.contains("trader") || joined.contains("joe"))
    {
        return Some(StoreMatch::new("trader_joes", 0.9, MatchSource::Pattern));
    }
    if hangul().is_match(raw)
        && (joined.contains("mart") || joined.contains("h-mart") || joined.contains("h mart"))
    {
        return Some(StoreMatch::new("h_mart", 0.9, MatchSource::Pattern));
    }
    if key_food_area().is_match(joined)
        && (joined.contains("key food") || joined.contains("keyfood"))
    {
        return Some(StoreMatch::new("key_food", 0.9, MatchSource::Pattern));
    }
    if joined.contains("46-02 queens")
        || (joined.contains("queens blvd") && joined.contains("sunnyside"))
    {
        return Some(StoreMatch::new("key_food", 0.85, MatchSource::Pattern));
    }
    if walmart_slogan().is_match(joined)
        || (joined.contains("walmart")
            && (joined.contains("supercenter") || joined.contains("neighborhood market")))
    {
        return Some(StoreMatch::new("walmart", 0.9, MatchSource::Pattern));
    }
    if target_slogan().is_match(joined) || joined.contains("target.com") {
        return Some(StoreMatch::new("target", 0.9, MatchSource::Pattern));
    }
    None
}

re!(header_welcome, r"(?:welcome to|store:?)\s*(.*)");
re!(header_store, r"^(.*?)\s*(?:store|receipt|invoice)");
re!(header_phone, r"^(.*?)\s*(?:tel|telephone|phone|fax)");
re!(header_address, r"^(.*?)\s*(?:address|location)");

fn header_patterns() -> [&'static Regex; 4] {
    [header_welcome(), header_store(), header_phone(), header_address()]
}

// ── Tests ───────────────────────────────────────────────────────────────────
