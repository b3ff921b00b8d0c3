use std::sync::LazyLock;

use regex::{Captures, Regex};

const UNIT_ALT: &str = r"kilograms?|kilos?|kg|grams?|g|litres?|liters?|ltr|l|millilitres?|milliliters?|ml|pounds?|lbs?|lb|oz|each|ea|packs?|pk";

/// "per kg", "/100g", " per 100 ml)" right after a price.
static UNIT_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*(?:per|/)\s*(?P<amt>\d+(?:[.,]\d+)?)?\s*(?P<unit>{UNIT_ALT})\b\.?\s*\)?"
    ))
    .unwrap()
});
static EACH_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?P<unit>each|ea)\b\.?\s*\)?").unwrap());
/// "per kg $13.96": only a "per" phrase counts before a price, a bare
/// "1kg $3.99" is a pack size.
static UNIT_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\bper\s+(?P<amt>\d+(?:[.,]\d+)?)?\s*(?P<unit>{UNIT_ALT})\s*:?\s*\(?\s*$"
    ))
    .unwrap()
});
/// A fragment that is nothing but a unit phrase.
static UNIT_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*\(?\s*(?:(?:per|/)\s*(?P<amt>\d+(?:[.,]\d+)?)?\s*(?P<unit>{UNIT_ALT})|(?P<each>each|ea))\b\.?\s*\)?\s*$"
    ))
    .unwrap()
});
static QUANTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:(?P<count>\d+)\s*[x×]\s*)?(?P<amt>\d+(?:[.,]\d+)?)\s*(?P<unit>kg|g|ml|l|lb|oz)\b",
    )
    .unwrap()
});
static PACK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?P<count>\d+)\s*-?\s*(?:pack|pk)\b").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    Weight,
    Volume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Kilogram,
    Gram,
    Pound,
    Ounce,
    Litre,
    Millilitre,
    Each,
    Pack,
}

impl Unit {
    pub fn parse(token: &str) -> Option<Unit> {
        let unit = match token.to_lowercase().as_str() {
            "kg" | "kilo" | "kilos" | "kilogram" | "kilograms" => Unit::Kilogram,
            "g" | "gram" | "grams" => Unit::Gram,
            "lb" | "lbs" | "pound" | "pounds" => Unit::Pound,
            "oz" => Unit::Ounce,
            "l" | "ltr" | "litre" | "litres" | "liter" | "liters" => Unit::Litre,
            "ml" | "millilitre" | "millilitres" | "milliliter" | "milliliters" => Unit::Millilitre,
            "each" | "ea" => Unit::Each,
            "pack" | "packs" | "pk" => Unit::Pack,
            _ => return None,
        };
        Some(unit)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Kilogram => "kg",
            Unit::Gram => "g",
            Unit::Pound => "lb",
            Unit::Ounce => "oz",
            Unit::Litre => "L",
            Unit::Millilitre => "ml",
            Unit::Each => "each",
            Unit::Pack => "pack",
        }
    }

    /// Measure and factor to the standard unit (kg or L).
    pub fn standard(self) -> Option<(Measure, f64)> {
        match self {
            Unit::Kilogram => Some((Measure::Weight, 1.0)),
            Unit::Gram => Some((Measure::Weight, 0.001)),
            Unit::Pound => Some((Measure::Weight, 0.453_592)),
            Unit::Ounce => Some((Measure::Weight, 0.028_349_5)),
            Unit::Litre => Some((Measure::Volume, 1.0)),
            Unit::Millilitre => Some((Measure::Volume, 0.001)),
            Unit::Each | Unit::Pack => None,
        }
    }
}

/// The "per <amount><unit>" a unit price is quoted against.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitToken {
    pub amount: Option<f64>,
    pub unit: Unit,
}

impl UnitToken {
    pub fn label(&self) -> String {
        match (self.unit, self.amount) {
            (Unit::Each, _) => "each".to_string(),
            (unit, Some(amount)) => format!("per {}{}", format_amount(amount), unit.symbol()),
            (unit, None) => format!("per {}", unit.symbol()),
        }
    }

    /// Size of the quoted unit in kg or L.
    pub fn standard_size(&self) -> Option<(Measure, f64)> {
        let (measure, factor) = self.unit.standard()?;
        Some((measure, self.amount.unwrap_or(1.0) * factor))
    }

    /// Quoted against less than one kg/L, e.g. "per 100g".
    pub fn is_sub_unit(&self) -> bool {
        self.standard_size().is_some_and(|(_, size)| size < 1.0)
    }
}

/// Pack size printed in a product name, e.g. "250g" or "2 x 150g".
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub text: String,
    pub count: u32,
    pub amount: f64,
    pub unit: Unit,
}

impl Quantity {
    pub fn standard_total(&self) -> Option<(Measure, f64)> {
        let (measure, factor) = self.unit.standard()?;
        Some((measure, self.count as f64 * self.amount * factor))
    }
}

// ── Matching ──

/// Unit phrase directly after a price; returns its byte length in `rest`.
pub fn unit_after(rest: &str) -> Option<(usize, UnitToken)> {
    let caps = UNIT_SUFFIX_RE
        .captures(rest)
        .or_else(|| EACH_SUFFIX_RE.captures(rest))?;
    let token = token_from(&caps)?;
    Some((caps.get(0)?.end(), token))
}

/// "per <unit>" phrase directly before a price; returns its start in `head`.
pub fn unit_before(head: &str) -> Option<(usize, UnitToken)> {
    let caps = UNIT_PREFIX_RE.captures(head)?;
    let token = token_from(&caps)?;
    Some((caps.get(0)?.start(), token))
}

/// Whole-fragment unit phrase such as "per kg" or "(each)".
pub fn unit_label(text: &str) -> Option<UnitToken> {
    let caps = UNIT_LABEL_RE.captures(text)?;
    if caps.name("each").is_some() {
        return Some(UnitToken {
            amount: None,
            unit: Unit::Each,
        });
    }
    token_from(&caps)
}

pub fn find_quantity(text: &str) -> Option<Quantity> {
    if let Some(caps) = QUANTITY_RE.captures(text) {
        let unit = Unit::parse(&caps["unit"])?;
        let amount = parse_number(&caps["amt"])?;
        let count = caps
            .name("count")
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(1);
        return Some(Quantity {
            text: normalize_spaces(&caps[0]).to_lowercase(),
            count,
            amount,
            unit,
        });
    }
    let caps = PACK_RE.captures(text)?;
    let count = caps["count"].parse::<u32>().ok()?;
    Some(Quantity {
        text: normalize_spaces(&caps[0]).to_lowercase(),
        count,
        amount: 1.0,
        unit: Unit::Pack,
    })
}

fn token_from(caps: &Captures) -> Option<UnitToken> {
    let unit = Unit::parse(caps.name("unit")?.as_str())?;
    let amount = caps.name("amt").and_then(|m| parse_number(m.as_str()));
    Some(UnitToken { amount, unit })
}

fn parse_number(s: &str) -> Option<f64> {
    s.replace(',', ".").parse::<f64>().ok()
}

fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("{}", amount as i64)
    } else {
        format!("{}", amount)
    }
}

fn normalize_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_per_kg() {
        let (len, token) = unit_after(" per kg").unwrap();
        assert_eq!(len, 7);
        assert_eq!(token.label(), "per kg");
    }

    #[test]
    fn suffix_slash_amount() {
        let (_, token) = unit_after("/100g").unwrap();
        assert_eq!(token.amount, Some(100.0));
        assert_eq!(token.unit, Unit::Gram);
        assert_eq!(token.label(), "per 100g");
        assert!(token.is_sub_unit());
    }

    #[test]
    fn suffix_closes_parenthesis() {
        let (len, token) = unit_after(" per kg) Fresh").unwrap();
        assert_eq!(&" per kg) Fresh"[..len], " per kg)");
        assert_eq!(token.unit, Unit::Kilogram);
    }

    #[test]
    fn suffix_each() {
        let (_, token) = unit_after(" each").unwrap();
        assert_eq!(token.label(), "each");
        assert!(!token.is_sub_unit());
    }

    #[test]
    fn offer_slash_is_not_a_unit() {
        assert!(unit_after(" / 2 for $6").is_none());
    }

    #[test]
    fn prefix_requires_per() {
        assert!(unit_before("per kg ").is_some());
        assert!(unit_before("1kg ").is_none());
    }

    #[test]
    fn labels() {
        assert_eq!(unit_label("per kg").unwrap().label(), "per kg");
        assert_eq!(unit_label("(per 100g)").unwrap().label(), "per 100g");
        assert_eq!(unit_label("/L").unwrap().label(), "per L");
        assert_eq!(unit_label("each").unwrap().label(), "each");
        assert!(unit_label("250g").is_none());
        assert!(unit_label("Organic Bananas").is_none());
    }

    #[test]
    fn quantities() {
        let q = find_quantity("Brussels Sprouts 250g Pack").unwrap();
        assert_eq!(q.text, "250g");
        assert_eq!(q.standard_total(), Some((Measure::Weight, 0.25)));

        let q = find_quantity("Yoghurt 2 x 150g").unwrap();
        assert_eq!(q.count, 2);
        assert_eq!(q.text, "2 x 150g");

        let q = find_quantity("Milk 1.5L").unwrap();
        assert_eq!(q.unit, Unit::Litre);

        let q = find_quantity("Cola 6 pack").unwrap();
        assert_eq!(q.unit, Unit::Pack);
        assert_eq!(q.count, 6);

        assert!(find_quantity("Organic Bananas").is_none());
    }
}
