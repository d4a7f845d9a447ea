/// Организационно-правовые формы, с которых «чистое» имя начинаться не должно.
pub const LEGAL_FORM_PREFIXES: [&str; 4] = ["ООО", "АО", "ЗАО", "ОАО"];

/// Normalizes a company name for duplicate detection: folds guillemet quotes
/// to plain ones and trims surrounding whitespace. «База „Стройка“» and
/// "База „Стройка“" must count as the same seller.
pub fn normalize_company(name: &str) -> String {
    name.replace('«', "\"").replace('»', "\"").trim().to_string()
}

/// True when a registry display name starts with a legal-form prefix
/// (ООО/АО/ЗАО/ОАО). Used to prefer the "cleanest" display name among
/// registry suggestions.
pub fn starts_with_legal_form(name: &str) -> bool {
    LEGAL_FORM_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Обрезает географический хвост вида «… г. Челябинск» из имени компании.
pub fn trim_city_suffix(name: &str) -> String {
    match name.split_once("г.") {
        Some((head, _)) => head.trim().to_string(),
        None => name.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_guillemets_and_trims() {
        assert_eq!(normalize_company("  ООО «Велес» "), "ООО \"Велес\"");
        assert_eq!(
            normalize_company("ООО «Велес»"),
            normalize_company(" ООО \"Велес\"")
        );
    }

    #[test]
    fn detects_legal_form_prefixes() {
        assert!(starts_with_legal_form("ООО Строительная компания Велес"));
        assert!(starts_with_legal_form("АО ИСМА"));
        assert!(starts_with_legal_form("ЗАО Завод"));
        assert!(!starts_with_legal_form("Строительная компания Велес"));
        // ОАО matches before the АО check matters for ordering-free logic
        assert!(starts_with_legal_form("ОАО РЖД"));
    }

    #[test]
    fn trims_city_suffix() {
        assert_eq!(trim_city_suffix("База Стройка г. Челябинск"), "База Стройка");
        assert_eq!(trim_city_suffix("База Стройка"), "База Стройка");
    }
}
