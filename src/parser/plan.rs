use serde::Deserialize;

/// Product attributes read from the labeled characteristics list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Color,
    Memory,
    Article,
    Diagonal,
    Resolution,
}

/// Labels identifying one attribute. Site locales differ, so a rule lists
/// every form the label has been seen in; exact matches win over substrings.
#[derive(Debug, Clone, Deserialize)]
pub struct LabelRule {
    pub field: Attribute,
    pub labels: Vec<String>,
}

impl LabelRule {
    fn new(field: Attribute, labels: &[&str]) -> Self {
        LabelRule {
            field,
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// Where each product field lives on the page. Defaults target brain.com.ua;
/// any key can be overridden under `[plan]` in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorPlan {
    /// Must match before extraction starts. The render backend also waits for it.
    pub ready: String,
    /// Clicked in order by the render backend to reveal the full characteristics list.
    pub expand: Vec<String>,
    /// Tried in order; the first that matches is the title.
    pub title: Vec<String>,
    pub characteristic_item: String,
    /// Label/value rows inside a characteristic item.
    pub characteristic_row: String,
    pub attributes: Vec<LabelRule>,
    pub vendor: String,
    pub price: String,
    pub discount_price: String,
    pub photos: String,
    /// Image attributes in order of preference.
    pub photo_attributes: Vec<String>,
    pub code: String,
    pub reviews: String,
}

impl Default for SelectorPlan {
    fn default() -> Self {
        SelectorPlan {
            ready: "h1, .product-title".into(),
            expand: vec![
                "a[href='#br-characteristics']".into(),
                ".br-prs-button".into(),
            ],
            title: vec!["h1".into(), ".product-title".into()],
            characteristic_item: ".br-pr-chr-item".into(),
            characteristic_row: "div > div".into(),
            attributes: vec![
                LabelRule::new(Attribute::Color, &["Колір", "Цвет"]),
                LabelRule::new(Attribute::Memory, &["Вбудована пам'ять", "Вбудована пам"]),
                LabelRule::new(Attribute::Article, &["Артикул"]),
                LabelRule::new(Attribute::Diagonal, &["Діагональ екрану", "Діагональ"]),
                LabelRule::new(
                    Attribute::Resolution,
                    &["Роздільна здатність екрану", "Роздільна"],
                ),
            ],
            vendor: ".br-pr-del-type .delivery-target strong".into(),
            price: ".br-pr-price.main-price-block .br-pr-np > div > span".into(),
            discount_price: ".br-pr-price.main-price-block .br-pr-np-hz > div > span".into(),
            photos: "img.dots-image".into(),
            photo_attributes: vec![
                "data-big-picture-src".into(),
                "data-src".into(),
                "src".into(),
            ],
            code: "#product_code .br-pr-code-val".into(),
            reviews: "a.scroll-to-element span".into(),
        }
    }
}
