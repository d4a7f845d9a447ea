// Pulscen-specific HTML parsing
use crate::model::ParserError;
use crate::normalizer::trim_city_suffix;
use crate::utils::truncate_words;
use ::scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;

/// Сырая карточка из листинга поиска, до всякой фильтрации.
#[derive(Debug, Clone)]
pub struct ListingEntry {
    pub product_name: String,
    pub url: String,
    pub company: String,
    pub price: String,
    pub currency: String,
    pub address: String,
}

/// Данные, извлекаемые со страницы товара.
#[derive(Debug, Clone, Default)]
pub struct ProductPage {
    pub page_text: String,
    pub characteristics: BTreeMap<String, String>,
    pub description: String,
    pub delivery_method: String,
    pub footer_address: String,
    pub seller_site: String,
}

pub struct PulscenParser;

impl PulscenParser {
    pub fn new() -> Self {
        Self
    }

    fn selector(css: &str) -> Result<Selector, ParserError> {
        Selector::parse(css).map_err(|e| ParserError::HtmlParseError(e.to_string()))
    }

    fn text_of(element: Option<ElementRef>) -> String {
        element
            .map(|e| e.text().collect::<String>().replace('\n', " ").trim().to_string())
            .unwrap_or_default()
    }

    /// Parses one search-results page into raw listing entries. Price may be
    /// empty (the collector decides what to do with that), the company name
    /// is already stripped of its «г. Город» tail.
    pub fn parse_listing(&self, html: &str) -> Result<Vec<ListingEntry>, ParserError> {
        let document = Html::parse_document(html);

        let item_sel = Self::selector("article.product-listing__item-wrapper")?;
        let name_sel = Self::selector("a.product-listing__product-name")?;
        let company_sel = Self::selector("span.product-listing__company-name-wrapper")?;
        let discount_sel = Self::selector(r#"i[data-price-type="discount-new"]"#)?;
        let exact_sel = Self::selector(r#"i[data-price-type="exact"]"#)?;
        let from_sel = Self::selector(r#"span[data-price-type="from"]"#)?;
        let to_sel = Self::selector(r#"span[data-price-type="to"]"#)?;
        let currency_sel = Self::selector("span.price-currency")?;
        let address_sel = Self::selector("div.product-listing__address")?;

        let mut entries = Vec::new();
        for article in document.select(&item_sel) {
            let Some(name_node) = article.select(&name_sel).next() else {
                continue;
            };
            let product_name = Self::text_of(Some(name_node));
            let href = name_node.value().attr("href").unwrap_or("").to_string();
            if href.is_empty() {
                continue;
            }
            let url = if href.starts_with("http") {
                href
            } else {
                format!("https://www.pulscen.ru{}", href)
            };

            let company = trim_city_suffix(&Self::text_of(article.select(&company_sel).next()));

            // Варианты цены: скидочная → точная → диапазон «от … до …».
            let price = {
                let discount = Self::text_of(article.select(&discount_sel).next());
                let exact = Self::text_of(article.select(&exact_sel).next());
                if !discount.is_empty() {
                    discount
                } else if !exact.is_empty() {
                    exact
                } else {
                    let from = Self::text_of(article.select(&from_sel).next());
                    let to = Self::text_of(article.select(&to_sel).next());
                    match (from.is_empty(), to.is_empty()) {
                        (false, false) => format!("от {} до {}", from, to),
                        (false, true) => format!("от {}", from),
                        _ => String::new(),
                    }
                }
            };

            let currency = {
                let c = Self::text_of(article.select(&currency_sel).next());
                if c.is_empty() { "руб.".to_string() } else { c }
            };
            let address = Self::text_of(article.select(&address_sel).next());

            entries.push(ListingEntry {
                product_name,
                url,
                company,
                price,
                currency,
                address,
            });
        }

        Ok(entries)
    }

    /// Ссылка на страницу `page_num` из пагинации, если она есть.
    pub fn next_page_url(&self, html: &str, page_num: u32) -> Option<String> {
        let document = Html::parse_document(html);
        let link_sel = Selector::parse("a.pagination__link").ok()?;
        for link in document.select(&link_sel) {
            let text = link.text().collect::<String>();
            if text.trim() == page_num.to_string() {
                let href = link.value().attr("href")?;
                return Some(if href.starts_with("http") {
                    href.to_string()
                } else {
                    format!("https://www.pulscen.ru{}", href)
                });
            }
        }
        None
    }

    /// Parses the product page: characteristics table, description capped at
    /// 70 words, delivery method, footer address block and the seller-site
    /// link. Anything missing stays an empty string.
    pub fn parse_product_page(&self, html: &str) -> Result<ProductPage, ParserError> {
        let document = Html::parse_document(html);

        let mut page = ProductPage {
            page_text: document.root_element().text().collect::<String>(),
            ..ProductPage::default()
        };

        let item_sel = Self::selector("div.product-description-list__item")?;
        let label_sel = Self::selector("span.product-description-list__label")?;
        let value_sel = Self::selector("span.product-description-list__value")?;
        for item in document.select(&item_sel) {
            let label = Self::text_of(item.select(&label_sel).next());
            let value = Self::text_of(item.select(&value_sel).next());
            if !label.is_empty() && !value.is_empty() {
                page.characteristics.insert(label, value);
            }
        }

        let descr_sel = Self::selector("div.product-description p")?;
        let description = document
            .select(&descr_sel)
            .map(|p| p.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        page.description = truncate_words(&description, 70);

        page.delivery_method = Self::text_of(
            document
                .select(&Self::selector("div.product-deliveries__name")?)
                .next(),
        );
        page.footer_address = Self::text_of(
            document
                .select(&Self::selector("div.footer-bottom__address")?)
                .next(),
        );
        page.seller_site = document
            .select(&Self::selector("a.js-ykr-action")?)
            .next()
            .and_then(|a| a.value().attr("href"))
            .unwrap_or("")
            .to_string();

        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING_HTML: &str = r#"
        <html><body>
        <article class="product-listing__item-wrapper">
            <a class="product-listing__product-name" href="/products/mel-mtd-2">Мел МТД-2 мешок 30 кг</a>
            <span class="product-listing__company-name-wrapper">База Стройка г. Челябинск</span>
            <i data-price-type="exact">260</i>
            <span class="price-currency">руб.</span>
            <div class="product-listing__address">Челябинск</div>
        </article>
        <article class="product-listing__item-wrapper">
            <a class="product-listing__product-name" href="https://other.ru/p/1">Мел природный</a>
            <span class="product-listing__company-name-wrapper">ООО Велес</span>
            <span data-price-type="from">240</span>
            <span data-price-type="to">300</span>
        </article>
        <article class="product-listing__item-wrapper">
            <a class="product-listing__product-name" href="/products/no-price">Мел без цены</a>
            <span class="product-listing__company-name-wrapper">Поставщик</span>
        </article>
        <a class="pagination__link" href="/search/price?q=мел&page=2">2</a>
        </body></html>
    "#;

    #[test]
    fn parses_listing_entries_with_price_variants() {
        let parser = PulscenParser::new();
        let entries = parser.parse_listing(LISTING_HTML).unwrap();
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].product_name, "Мел МТД-2 мешок 30 кг");
        assert_eq!(entries[0].url, "https://www.pulscen.ru/products/mel-mtd-2");
        assert_eq!(entries[0].company, "База Стройка");
        assert_eq!(entries[0].price, "260");
        assert_eq!(entries[0].currency, "руб.");

        assert_eq!(entries[1].url, "https://other.ru/p/1");
        assert_eq!(entries[1].price, "от 240 до 300");
        // валюта по умолчанию
        assert_eq!(entries[1].currency, "руб.");

        assert_eq!(entries[2].price, "");
    }

    #[test]
    fn finds_next_page_link() {
        let parser = PulscenParser::new();
        let url = parser.next_page_url(LISTING_HTML, 2).unwrap();
        assert!(url.starts_with("https://www.pulscen.ru/search/price"));
        assert!(parser.next_page_url(LISTING_HTML, 3).is_none());
    }

    #[test]
    fn parses_product_page_blocks() {
        let html = r#"
            <html><body>
            <div class="product-deliveries__name">Самовывоз</div>
            <div class="product-description-list__item">
                <span class="product-description-list__label">Масса</span>
                <span class="product-description-list__value">30 кг</span>
            </div>
            <div class="product-description"><p>Мел молотый.</p><p>Для строительных работ.</p></div>
            <a class="js-ykr-action" href="https://seller.ru">Сайт</a>
            <div class="footer-bottom__address">г. Челябинск, ул. Труда, 15 8 (351) 123-45-67</div>
            </body></html>
        "#;
        let parser = PulscenParser::new();
        let page = parser.parse_product_page(html).unwrap();
        assert_eq!(page.delivery_method, "Самовывоз");
        assert_eq!(page.characteristics.get("Масса").unwrap(), "30 кг");
        assert_eq!(page.description, "Мел молотый. Для строительных работ.");
        assert_eq!(page.seller_site, "https://seller.ru");
        assert!(page.footer_address.contains("Труда"));
        assert!(page.page_text.contains("Мел молотый"));
    }
}
