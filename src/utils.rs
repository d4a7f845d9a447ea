// Utility functions
use chrono::{Datelike, FixedOffset, Utc};
use regex::Regex;
use std::sync::OnceLock;

const PHONE_PATTERN: &str =
    r"(?:\+7|8|7)[\s\-\(\)]*\d{3}[\s\-\(\)]*\d{3}[\s\-\(\)]*\d{2}[\s\-\(\)]*\d{2}";

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PHONE_PATTERN).expect("invalid phone regex"))
}

/// Находит первый телефонный номер в тексте и приводит его к виду +7XXXXXXXXXX.
pub fn extract_phone(text: &str) -> Option<String> {
    let raw = phone_re().find(text)?.as_str();
    let cleaned: String = raw.chars().filter(|c| c.is_ascii_digit() || *c == '+').collect();
    if cleaned.len() == 11 && cleaned.starts_with('8') {
        Some(format!("+7{}", &cleaned[1..]))
    } else {
        Some(cleaned)
    }
}

/// Слова, после которых адрес считается оборванным («…въезд со двора»).
const ADDRESS_STOP_WORDS: [&str; 12] = [
    "въезд",
    "подъезд",
    "выезд",
    "проезд",
    "переезд",
    "объезд",
    "приезд",
    "въезжая",
    "выезжающий",
    "объезжающий",
    "проезжающий",
    "переезжающий",
];

/// Извлекает почтовый адрес из сырого текста футера: отрезает телефон,
/// ищет якорь «г./город/пос./пгт/деревня/село», отбрасывает стоп-слова.
/// Возвращает пустую строку, если якорь не найден, и `"не найдено"`, если
/// после чистки ничего не осталось.
pub fn extract_address(raw: &str) -> String {
    let address_part = match phone_re().find(raw) {
        Some(m) => &raw[..m.start()],
        None => raw,
    };

    static ANCHOR: OnceLock<Regex> = OnceLock::new();
    let anchor = ANCHOR.get_or_init(|| {
        Regex::new(r"(?i)(г\.|город|пос\.|пгт|деревня|село)[^+]{10,1000}")
            .expect("invalid address regex")
    });

    let Some(m) = anchor.find(address_part) else {
        return String::new();
    };
    let mut address = m.as_str().trim().to_string();
    address = address.trim_end_matches([' ', ',', ';']).to_string();
    for word in ADDRESS_STOP_WORDS {
        if let Some(pos) = address.to_lowercase().find(word) {
            if address.is_char_boundary(pos) {
                address.truncate(pos);
            }
        }
    }
    let address = address.trim_end_matches([' ', ',', ';']).trim().to_string();
    if address.is_empty() {
        crate::model::NOT_FOUND.to_string()
    } else {
        address
    }
}

/// Обрезает текст до `limit` слов, добавляя многоточие.
pub fn truncate_words(text: &str, limit: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() > limit {
        format!("{}...", words[..limit].join(" "))
    } else {
        words.join(" ")
    }
}

/// Текущая дата-время по Москве (UTC+3), формат `%Y-%m-%d %H:%M:%S`.
pub fn current_date_moscow() -> String {
    let msk = FixedOffset::east_opt(3 * 3600).expect("valid offset");
    Utc::now().with_timezone(&msk).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Московское время в виде, пригодном для имени файла: `%Y%m%d_%H%M%S`.
pub fn file_timestamp() -> String {
    let msk = FixedOffset::east_opt(3 * 3600).expect("valid offset");
    Utc::now().with_timezone(&msk).format("%Y%m%d_%H%M%S").to_string()
}

/// Текущий год и квартал (1..=4).
pub fn year_quarter() -> (i32, u32) {
    let today = Utc::now();
    (today.year(), (today.month() - 1) / 3 + 1)
}

/// Безопасное имя папки `{code}_{name}`: не-словарные символы заменяются
/// на `_`, имя материала ограничено 100 символами.
pub fn safe_dir_name(code: &str, name: &str) -> String {
    fn sanitize(s: &str, fallback: &str) -> String {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return fallback.to_string();
        }
        trimmed
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }
    let safe_code = sanitize(code, "unknown_code");
    let mut safe_name = sanitize(name, "unknown_name");
    if safe_name.chars().count() > 100 {
        safe_name = safe_name.chars().take(100).collect();
    }
    format!("{}_{}", safe_code, safe_name)
}

/// Домен из URL — сегмент хоста, как его видит список исключений.
pub fn extract_domain(url: &str) -> String {
    if url.starts_with("http") {
        url.split('/').nth(2).unwrap_or(url).to_string()
    } else {
        url.to_string()
    }
}
