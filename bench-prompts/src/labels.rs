//! Stable demographic label translation.
//!
//! Ported from `TranslatorService`'s CSV-backed `key -> value` lookup
//! (`translator.py`): the original loads `lang/de.csv` at runtime via the
//! (out-of-scope) lookup-table-ingestion collaborator. The core only
//! needs the stable built-in fallback labels the original also falls
//! back to when a key is missing from the CSV (`translations.get(key,
//! key)`), so they are declared here as a static table rather than
//! re-implementing CSV ingestion in the benchmark core.

use rustc_hash::FxHashMap;
use std::sync::LazyLock;

static LABELS: LazyLock<FxHashMap<&'static str, &'static str>> = LazyLock::new(|| {
    FxHashMap::from_iter([
        ("male", "männlich"),
        ("female", "weiblich"),
        ("diverse", "divers"),
        ("no_degree", "ohne Abschluss"),
        ("secondary", "Sekundarabschluss"),
        ("vocational", "Berufsausbildung"),
        ("bachelor", "Bachelor"),
        ("master", "Master"),
        ("doctorate", "Promotion"),
        ("single", "ledig"),
        ("married", "verheiratet"),
        ("divorced", "geschieden"),
        ("widowed", "verwitwet"),
        ("with_migration", "mit Migrationshintergrund"),
        ("without_migration", "ohne Migrationshintergrund"),
        ("christian", "christlich"),
        ("muslim", "muslimisch"),
        ("jewish", "jüdisch"),
        ("buddhist", "buddhistisch"),
        ("hindu", "hinduistisch"),
        ("atheist", "atheistisch"),
        ("none", "konfessionslos"),
        ("heterosexual", "heterosexuell"),
        ("homosexual", "homosexuell"),
        ("bisexual", "bisexuell"),
        ("asexual", "asexuell"),
    ])
});

/// Translate a raw stored key to its stable display label, falling back
/// to the key itself when no translation is registered — the same
/// `translations.get(key, key)` fallback the original `TranslatorService`
/// uses when a CSV row is missing.
pub fn translate(key: &str) -> String {
    LABELS.get(key).map(|s| s.to_string()).unwrap_or_else(|| key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_key_translates() {
        assert_eq!(translate("male"), "männlich");
    }

    #[test]
    fn unknown_key_falls_back_to_itself() {
        assert_eq!(translate("nonbinary-custom"), "nonbinary-custom");
    }
}
