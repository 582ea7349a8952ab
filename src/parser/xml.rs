//! XML 发票: 优先按 UBL 2.1 (Invoice / CreditNote) 路径读取,
//! 其余 XML 按标签关键字做通用识别。

use super::text::parse_amount;
use crate::error::ParseError;
use crate::models::{ParsedDocument, ParsedHeader, ParsedItem};
use bigdecimal::BigDecimal;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

const UBL_LINES: [&str; 2] = ["InvoiceLine", "CreditNoteLine"];

pub(crate) fn parse(xml: &str) -> Result<ParsedDocument, ParseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut doc = XmlInvoice::default();
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                path.push(local_name(e));
                doc.open(&path, e);
            }
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default();
                doc.text(&path, text.trim());
            }
            Ok(Event::CData(ref e)) => {
                let raw = e.clone().into_inner();
                doc.text(&path, String::from_utf8_lossy(&raw).trim());
            }
            Ok(Event::End(_)) => {
                doc.close(&path);
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                let position = reader.buffer_position();
                if doc.has_content() {
                    tracing::warn!(error = %e, position, "Malformed XML, keeping what was read so far");
                    break;
                }
                return Err(ParseError::UnreadableDocument(format!(
                    "malformed XML at byte {position}: {e}"
                )));
            }
            _ => {}
        }
    }

    Ok(doc.finish())
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// 标签名归一: 小写, 去掉 `_` `-`
fn tag_key(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

fn set_once(slot: &mut Option<String>, value: &str) {
    if slot.is_none() {
        *slot = Some(value.to_string());
    }
}

fn set_amount_once(slot: &mut Option<BigDecimal>, value: &str) {
    if slot.is_none() {
        *slot = parse_amount(value);
    }
}

#[derive(Default)]
struct UblLine {
    item: ParsedItem,
    name: Option<String>,
}

impl UblLine {
    fn text(&mut self, path: &[String], text: &str) {
        let (Some(name), Some(parent)) = (path.last(), path.iter().rev().nth(1)) else {
            return;
        };
        match (name.as_str(), parent.as_str()) {
            ("InvoicedQuantity" | "CreditedQuantity", _) => set_amount_once(&mut self.item.quantity, text),
            ("Description", "Item") => set_once(&mut self.item.description, text),
            ("Name", "Item") => set_once(&mut self.name, text),
            ("PriceAmount", "Price") => set_amount_once(&mut self.item.unit_price, text),
            ("LineExtensionAmount", p) if UBL_LINES.contains(&p) => {
                set_amount_once(&mut self.item.total_price, text)
            }
            ("ID", "SellersItemIdentification") => set_once(&mut self.item.sku_raw, text),
            _ => {}
        }
    }

    fn finish(self) -> Option<ParsedItem> {
        let mut item = self.item;
        item.description = item.description.or(self.name);
        item.description.is_some().then(|| item.fill_total())
    }
}

/// 通用 XML: 标签名含 item/line 的元素视为明细, 其直接子元素按关键字归类
#[derive(Default)]
struct GenericCollector {
    header: ParsedHeader,
    open: Vec<(usize, ParsedItem)>,
    items: Vec<ParsedItem>,
}

impl GenericCollector {
    fn is_candidate(name: &str) -> bool {
        let key = tag_key(name);
        (key.contains("item") || key.contains("line")) && !key.contains("amount")
    }

    fn item_field(item: &mut ParsedItem, name: &str, text: &str) {
        let key = tag_key(name);
        if key.contains("sku") || key.contains("code") || key == "cod" {
            set_once(&mut item.sku_raw, text);
        } else if key.contains("qty") || key.contains("quantity") || key.contains("cant") {
            set_amount_once(&mut item.quantity, text);
        } else if key.contains("total") || key.contains("amount") || key.contains("valoare") || key.contains("value") {
            set_amount_once(&mut item.total_price, text);
        } else if key.contains("price") || key.contains("pret") {
            set_amount_once(&mut item.unit_price, text);
        } else if key.contains("unit") || key == "um" || key == "uom" {
            set_once(&mut item.unit, text);
        } else if key.contains("desc") || key.contains("name") || key.contains("product") || key.contains("denumire") {
            set_once(&mut item.description, text);
        }
    }

    fn header_field(&mut self, path: &[String], text: &str) {
        let Some(name) = path.last() else { return };
        let key = tag_key(name);
        let is_supplier = |k: &str| {
            ["supplier", "vendor", "seller", "furnizor"]
                .iter()
                .any(|s| k.contains(s))
        };
        let under_supplier = path.iter().any(|p| is_supplier(&tag_key(p)));

        if is_supplier(&key) || (under_supplier && (key == "name" || key == "companyname")) {
            set_once(&mut self.header.supplier, text);
        } else if matches!(
            key.as_str(),
            "invoicenumber" | "invoiceno" | "invoiceid" | "documentnumber" | "number" | "numar" | "nr"
        ) {
            set_once(&mut self.header.invoice_number, text);
        } else if key.contains("date") && !key.contains("due") {
            set_once(&mut self.header.invoice_date, text);
        } else if key.contains("total") {
            set_amount_once(&mut self.header.total_amount, text);
        }
    }
}

#[derive(Default)]
struct XmlInvoice {
    header: ParsedHeader,
    registration_name: Option<String>,
    payable_amount: Option<BigDecimal>,
    current_line: Option<UblLine>,
    lines: Vec<ParsedItem>,
    generic: GenericCollector,
}

impl XmlInvoice {
    fn in_ubl_line(path: &[String]) -> bool {
        path.iter().any(|p| UBL_LINES.contains(&p.as_str()))
    }

    fn open(&mut self, path: &[String], e: &BytesStart<'_>) {
        let Some(name) = path.last() else { return };

        if UBL_LINES.contains(&name.as_str()) {
            self.current_line = Some(UblLine::default());
            return;
        }
        if Self::in_ubl_line(path) {
            if name == "InvoicedQuantity" || name == "CreditedQuantity" {
                let unit = e
                    .attributes()
                    .flatten()
                    .find(|attr| attr.key.local_name().as_ref() == b"unitCode")
                    .map(|attr| String::from_utf8_lossy(&attr.value).into_owned());
                if let (Some(line), Some(unit)) = (self.current_line.as_mut(), unit) {
                    line.item.unit.get_or_insert(unit);
                }
            }
            return;
        }
        if GenericCollector::is_candidate(name) {
            self.generic.open.push((path.len(), ParsedItem::default()));
        }
    }

    fn text(&mut self, path: &[String], text: &str) {
        if text.is_empty() {
            return;
        }
        if Self::in_ubl_line(path) {
            if let Some(line) = self.current_line.as_mut() {
                line.text(path, text);
            }
            return;
        }
        if let Some((depth, item)) = self.generic.open.last_mut() {
            if path.len() == *depth {
                set_once(&mut item.description, text);
            } else if path.len() == *depth + 1 {
                if let Some(name) = path.last() {
                    GenericCollector::item_field(item, name, text);
                }
            }
            return;
        }

        self.ubl_header(path, text);
        self.generic.header_field(path, text);
    }

    fn ubl_header(&mut self, path: &[String], text: &str) {
        let (Some(name), Some(parent)) = (path.last(), path.iter().rev().nth(1)) else {
            return;
        };
        let supplier_party = path.iter().any(|p| p == "AccountingSupplierParty");

        match name.as_str() {
            "ID" if path.len() == 2 => set_once(&mut self.header.invoice_number, text),
            "IssueDate" if path.len() == 2 => set_once(&mut self.header.invoice_date, text),
            "Name" if supplier_party && parent == "PartyName" => set_once(&mut self.header.supplier, text),
            "RegistrationName" if supplier_party => set_once(&mut self.registration_name, text),
            "TaxInclusiveAmount" if parent == "LegalMonetaryTotal" => {
                set_amount_once(&mut self.header.total_amount, text)
            }
            "PayableAmount" if parent == "LegalMonetaryTotal" => set_amount_once(&mut self.payable_amount, text),
            _ => {}
        }
    }

    fn close(&mut self, path: &[String]) {
        let Some(name) = path.last() else { return };

        if UBL_LINES.contains(&name.as_str()) {
            if let Some(item) = self.current_line.take().and_then(UblLine::finish) {
                self.lines.push(item);
            }
            return;
        }
        if self.generic.open.last().map(|(depth, _)| *depth) == Some(path.len()) {
            if let Some((_, item)) = self.generic.open.pop() {
                if item.description.is_some() {
                    self.generic.items.push(item.fill_total());
                }
            }
        }
    }

    fn has_content(&self) -> bool {
        self.header.detected_fields() > 0
            || self.generic.header.detected_fields() > 0
            || !self.lines.is_empty()
            || !self.generic.items.is_empty()
    }

    fn finish(self) -> ParsedDocument {
        let generic = self.generic.header;
        let header = ParsedHeader {
            supplier: self.header.supplier.or(self.registration_name).or(generic.supplier),
            invoice_number: self.header.invoice_number.or(generic.invoice_number),
            invoice_date: self.header.invoice_date.or(generic.invoice_date),
            total_amount: self
                .header
                .total_amount
                .or(self.payable_amount)
                .or(generic.total_amount),
        };
        let items = if self.lines.is_empty() {
            self.generic.items
        } else {
            self.lines
        };

        ParsedDocument {
            format: None,
            header,
            items,
        }
    }
}
