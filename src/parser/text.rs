use crate::models::{ParsedDocument, ParsedHeader, ParsedItem};
use bigdecimal::{BigDecimal, Zero};
use once_cell::sync::Lazy;
use regex::Regex;
use std::str::FromStr;

/// 从纯文本 (PDF/DOC/DOCX/TXT 提取结果) 中抽取发票信息
pub fn extract(text: &str) -> ParsedDocument {
    ParsedDocument {
        format: None,
        header: ParsedHeader {
            supplier: extract_supplier(text),
            invoice_number: extract_invoice_number(text),
            invoice_date: extract_invoice_date(text),
            total_amount: extract_total_amount(text),
        },
        items: extract_line_items(text),
    }
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in invoice pattern must compile")
}

// ---------------------------------------------------------------------------
// 抬头字段
// ---------------------------------------------------------------------------

static SUPPLIER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        compile(r"(?i)\b(?:supplier|furnizor|from)\b[:\s]+([^\n]+)"),
        compile(r"(?i)\b(?:company|societate)\b[:\s]+([^\n]+)"),
    ]
});

static INVOICE_NUMBER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        compile(
            r"(?i)\b(?:invoice|factura|factur[aă])\b[^:\n]*?\b(?:no|nr|number|num[aă]r)\b[.:\s#]+([A-Z0-9][A-Z0-9\-/]*)",
        ),
        compile(r"(?i)\b(?:no|nr)\b[.:\s#]+([A-Z0-9][A-Z0-9\-/]*)"),
    ]
});

static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        compile(
            r"(?i)\b(?:date|data)\b[^\d\n]{0,20}(\d{4}-\d{2}-\d{2}|\d{1,2}[./-]\d{1,2}[./-]\d{2,4})",
        ),
        compile(r"\b(\d{4}-\d{2}-\d{2})\b"),
        compile(r"\b(\d{1,2}[/-]\d{1,2}[/-]\d{2,4})\b"),
    ]
});

static TOTAL_PATTERN: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\btotal\b[^\d\n]{0,40}?(\d[\d.,]*)"));

fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns.iter().find_map(|re| {
        re.captures(text)
            .map(|c| c[1].trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

fn extract_supplier(text: &str) -> Option<String> {
    first_capture(&SUPPLIER_PATTERNS, text)
}

fn extract_invoice_number(text: &str) -> Option<String> {
    first_capture(&INVOICE_NUMBER_PATTERNS, text)
}

fn extract_invoice_date(text: &str) -> Option<String> {
    first_capture(&DATE_PATTERNS, text)
}

/// 取最后一个 "Total" 金额 (小计在前, 应付总额在后)
fn extract_total_amount(text: &str) -> Option<BigDecimal> {
    TOTAL_PATTERN
        .captures_iter(text)
        .filter_map(|c| parse_amount(&c[1]))
        .last()
}

// ---------------------------------------------------------------------------
// 明细行
// ---------------------------------------------------------------------------

const UNITS: &[&str] = &["buc", "bucăți", "bucati", "kg", "m", "l", "h", "set", "pcs"];

static SKIP_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^\s*(BANCA|CONT|Capital|Sediul|Nr\.\s*ord|C\.I\.F|CUI|Numar|TOTAL|Semnatura|Expedierea)",
        r"(?i)^\s*Date privind",
        r"(?i)^\s*(Cumparator|Furnizor|Supplier|Buyer):",
        r"(?i)^\s*Scadenta:",
        r"(?i)^\s*GESTIUNEA",
        r"(?i)^\s*Total.*:",
        r"(?i)^\s*Mijloc de transport",
        r"(?i)^\s*Numele delegatului",
        r"(?i)^\s*Buletin",
        r"(?i)^\s*Emis de",
    ]
    .iter()
    .map(|p| compile(p))
    .collect()
});

// 1 35FV1598 +Invertor monofazat ... buc 1,000 3.179,84 3.179,84
static NUMBERED_ROW: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"^\d+\s+([A-Z0-9\-]*\d[A-Z0-9\-]*)\s+(.+?)\s+((?i:bucăți|bucati|buc|kg|m|l|h|set|pcs))\.?\s+([\d.,]+)\s+([\d.,]+)\s+([\d.,]+)",
    )
});

// <descriere> <cant> [um] <pret> <total>
static STANDARD_ROW: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"^(.+?)\s+([\d.,]+)\s+(?:((?i:bucăți|bucati|buc|kg|m|l|h|set|pcs))\.?\s+)?([\d.,]+)\s+([\d.,]+)",
    )
});

static SIMPLE_ROW: Lazy<Regex> = Lazy::new(|| compile(r"^(.{10,})\s+([\d.,]+)\s+([\d.,]+)\s*$"));

static UNIT_IN_TEXT: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)\b(bucăți|bucati|buc|kg|set|pcs)\b"));
static EDGE_NOISE: Lazy<Regex> = Lazy::new(|| compile(r"^[+\-@*#&\s]+|[+\-@*#&\s]+$"));
static CURRENCY: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\bRON\b"));
static SPACES: Lazy<Regex> = Lazy::new(|| compile(r"\s+"));

fn clean_description(raw: &str) -> String {
    let s = CURRENCY.replace_all(raw, "");
    let s = SPACES.replace_all(&s, " ");
    EDGE_NOISE.replace_all(s.trim(), "").trim().to_string()
}

fn is_unit_word(s: &str) -> bool {
    UNITS.iter().any(|u| u.eq_ignore_ascii_case(s))
}

fn is_skipped(line: &str) -> bool {
    SKIP_PATTERNS.iter().any(|re| re.is_match(line))
}

fn candidate_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|line| line.chars().count() >= 10 && !is_skipped(line))
}

fn extract_line_items(text: &str) -> Vec<ParsedItem> {
    let items: Vec<ParsedItem> = candidate_lines(text)
        .filter_map(|line| numbered_row(line).or_else(|| standard_row(line)))
        .collect();

    if !items.is_empty() {
        return items;
    }

    candidate_lines(text).filter_map(simple_row).collect()
}

fn numbered_row(line: &str) -> Option<ParsedItem> {
    let caps = NUMBERED_ROW.captures(line)?;
    let description = clean_description(&caps[2]);
    if description.chars().count() < 3 || is_unit_word(&description) {
        return None;
    }

    Some(ParsedItem {
        description: Some(description),
        sku_raw: Some(caps[1].to_string()),
        quantity: parse_amount(&caps[4]),
        unit: Some(caps[3].to_lowercase()),
        unit_price: parse_amount(&caps[5]),
        total_price: parse_amount(&caps[6]),
    })
}

fn standard_row(line: &str) -> Option<ParsedItem> {
    let caps = STANDARD_ROW.captures(line)?;
    let mut description = clean_description(&caps[1]);
    if is_unit_word(&description) {
        return None;
    }

    let quantity = parse_amount(&caps[2])?;
    let unit_price = parse_amount(&caps[4])?;
    let total_price = parse_amount(&caps[5])?;

    let mut unit = caps.get(3).map(|m| m.as_str().to_lowercase());
    if unit.is_none() {
        if let Some(m) = UNIT_IN_TEXT.find(&description) {
            unit = Some(m.as_str().to_lowercase());
            description = SPACES
                .replace_all(&description.replacen(m.as_str(), "", 1), " ")
                .trim()
                .to_string();
        }
    }

    let consistent =
        (&quantity * &unit_price - &total_price).abs() < BigDecimal::from(1) || total_price > BigDecimal::zero();
    if description.chars().count() <= 2 || !consistent {
        return None;
    }

    Some(ParsedItem {
        description: Some(description),
        sku_raw: None,
        quantity: Some(quantity),
        unit,
        unit_price: Some(unit_price),
        total_price: Some(total_price),
    })
}

fn simple_row(line: &str) -> Option<ParsedItem> {
    let caps = SIMPLE_ROW.captures(line)?;
    let description = clean_description(&caps[1]);
    if description.chars().count() < 3 {
        return None;
    }

    Some(
        ParsedItem {
            description: Some(description),
            quantity: Some(parse_amount(&caps[2])?),
            unit_price: Some(parse_amount(&caps[3])?),
            ..Default::default()
        }
        .fill_total(),
    )
}

/// 解析金额/数量, 兼容 `1.234,56` `1,234.56` `12,5` `3.179`
///
/// 同时出现 `.` 和 `,` 时以最后出现者为小数点; 单一分隔符出现多次视为千分位。
pub fn parse_amount(raw: &str) -> Option<BigDecimal> {
    let s: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\'')
        .collect();
    let s = s.trim_matches(|c| c == '.' || c == ',');
    if s.is_empty() {
        return None;
    }

    let normalized = match (s.rfind('.'), s.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (None, Some(_)) if s.matches(',').count() > 1 => s.replace(',', ""),
        (None, Some(_)) => s.replace(',', "."),
        (Some(_), None) if s.matches('.').count() > 1 => s.replace('.', ""),
        _ => s.to_string(),
    };

    if !normalized.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-') {
        return None;
    }
    BigDecimal::from_str(&normalized).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    const ROMSTAL_SAMPLE: &str = "\
ROMSTAL IMEX SRL
Furnizor: ROMSTAL IMEX SRL
C.I.F: RO1234567
Factura seria RMS nr. 4410021
Data emiterii: 12.03.2024
Nr. ord Cod Denumire UM Cant Pret Valoare
1 35FV1598 +Invertor monofazat Huawei SUN2000-5KTL buc 1,000 3.179,84 3.179,84
2 44CB0061 Cablu solar 6mm rosu RON m 100,000 4,20 420,00
TOTAL: 3.599,84
Total de plata: 4.283,81
";

    #[test]
    fn numbered_rows_with_sku() {
        let doc = extract(ROMSTAL_SAMPLE);
        assert_eq!(doc.items.len(), 2);

        let inverter = &doc.items[0];
        assert_eq!(inverter.sku_raw.as_deref(), Some("35FV1598"));
        assert_eq!(
            inverter.description.as_deref(),
            Some("Invertor monofazat Huawei SUN2000-5KTL")
        );
        assert_eq!(inverter.unit.as_deref(), Some("buc"));
        assert_eq!(inverter.quantity, Some(dec("1")));
        assert_eq!(inverter.unit_price, Some(dec("3179.84")));

        let cable = &doc.items[1];
        assert_eq!(cable.description.as_deref(), Some("Cablu solar 6mm rosu"));
        assert_eq!(cable.unit.as_deref(), Some("m"));
        assert_eq!(cable.quantity, Some(dec("100")));
        assert_eq!(cable.total_price, Some(dec("420")));
    }

    #[test]
    fn header_fields() {
        let doc = extract(ROMSTAL_SAMPLE);
        assert_eq!(doc.header.supplier.as_deref(), Some("ROMSTAL IMEX SRL"));
        assert_eq!(doc.header.invoice_number.as_deref(), Some("4410021"));
        assert_eq!(doc.header.invoice_date.as_deref(), Some("12.03.2024"));
        assert_eq!(doc.header.total_amount, Some(dec("4283.81")));
    }

    #[test]
    fn standard_rows_pick_up_units() {
        let text = "\
Invoice number: INV-2024-001
Date: 2024-01-15
Panou fotovoltaic 450W 10 buc 500,00 5.000,00
Structura montaj tigla kg 25 12,40 310,00
";
        let doc = extract(text);
        assert_eq!(doc.header.invoice_number.as_deref(), Some("INV-2024-001"));
        assert_eq!(doc.header.invoice_date.as_deref(), Some("2024-01-15"));
        assert_eq!(doc.items.len(), 2);

        assert_eq!(doc.items[0].description.as_deref(), Some("Panou fotovoltaic 450W"));
        assert_eq!(doc.items[0].unit.as_deref(), Some("buc"));
        assert_eq!(doc.items[0].total_price, Some(dec("5000")));

        assert_eq!(doc.items[1].description.as_deref(), Some("Structura montaj tigla"));
        assert_eq!(doc.items[1].unit.as_deref(), Some("kg"));
        assert_eq!(doc.items[1].quantity, Some(dec("25")));
    }

    #[test]
    fn simple_rows_are_a_fallback() {
        let text = "Servicii montaj sistem fotovoltaic 1 2500\n";
        let doc = extract(text);
        assert_eq!(doc.items.len(), 1);
        assert_eq!(doc.items[0].quantity, Some(dec("1")));
        assert_eq!(doc.items[0].unit_price, Some(dec("2500")));
        assert_eq!(doc.items[0].total_price, Some(dec("2500")));
    }

    #[test]
    fn amounts_in_both_conventions() {
        assert_eq!(parse_amount("3.179,84"), Some(dec("3179.84")));
        assert_eq!(parse_amount("1,234.56"), Some(dec("1234.56")));
        assert_eq!(parse_amount("12,5"), Some(dec("12.5")));
        assert_eq!(parse_amount("1.000.000"), Some(dec("1000000")));
        assert_eq!(parse_amount("1190.00."), Some(dec("1190")));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("1e5"), None);
    }

    #[test]
    fn amounts_keep_every_digit() {
        let amount = parse_amount("0,10").unwrap() + parse_amount("0,20").unwrap();
        assert_eq!(amount, dec("0.3"));
        assert_eq!(parse_amount("4,20").unwrap().to_string(), "4.20");
    }
}
