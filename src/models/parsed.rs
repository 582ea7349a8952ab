use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 支持的发票文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Doc,
    Docx,
    Txt,
    Xml,
}

impl DocumentFormat {
    /// 按扩展名识别 (不区分大小写, 可带前导点)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "doc" => Some(Self::Doc),
            "docx" => Some(Self::Docx),
            "txt" => Some(Self::Txt),
            "xml" => Some(Self::Xml),
            _ => None,
        }
    }

    /// 按文件头嗅探
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

        if bytes.starts_with(b"%PDF") {
            return Some(Self::Pdf);
        }
        if bytes.starts_with(b"PK\x03\x04") {
            return Some(Self::Docx);
        }
        if bytes.starts_with(OLE_MAGIC) {
            return Some(Self::Doc);
        }

        let head = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let first = head.iter().find(|b| !b.is_ascii_whitespace())?;
        if *first == b'<' {
            Some(Self::Xml)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Doc => "doc",
            Self::Docx => "docx",
            Self::Txt => "txt",
            Self::Xml => "xml",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 发票抬头字段, 每个字段都可能未识别
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedHeader {
    pub supplier: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub total_amount: Option<BigDecimal>,
}

impl ParsedHeader {
    pub fn detected_fields(&self) -> usize {
        [
            self.supplier.is_some(),
            self.invoice_number.is_some(),
            self.invoice_date.is_some(),
            self.total_amount.is_some(),
        ]
        .iter()
        .filter(|&&v| v)
        .count()
    }
}

/// 解析出的发票明细行
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedItem {
    pub description: Option<String>,
    pub sku_raw: Option<String>,
    pub quantity: Option<BigDecimal>,
    pub unit: Option<String>,
    pub unit_price: Option<BigDecimal>,
    pub total_price: Option<BigDecimal>,
}

impl ParsedItem {
    /// 缺少行金额时用 数量×单价 补齐
    pub fn fill_total(mut self) -> Self {
        if self.total_price.is_none() {
            if let (Some(q), Some(p)) = (&self.quantity, &self.unit_price) {
                self.total_price = Some(q * p);
            }
        }
        self
    }
}

/// 解析器输出
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub format: Option<DocumentFormat>,
    pub header: ParsedHeader,
    pub items: Vec<ParsedItem>,
}

impl ParsedDocument {
    /// 抬头和明细都没有任何内容
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.header.detected_fields() == 0
    }
}

/// 物料匹配建议
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchSuggestion {
    pub material_id: i64,
    pub confidence: f64,
}
