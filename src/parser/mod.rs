//! 发票文档解析
//!
//! 输入为原始字节和声明的格式, 输出尽力而为的结构化结果: 抬头字段和明细行均可缺失,
//! 只有抬头和明细全空时才视为无法读取。解析是纯计算, 没有副作用。

mod extract;
mod text;
mod xml;

use crate::error::ParseError;
use crate::models::{DocumentFormat, ParsedDocument};
use std::path::Path;

pub use text::parse_amount;

/// 根据文件名扩展名确定格式; 没有扩展名时按文件头嗅探
pub fn detect_format(filename: Option<&str>, bytes: &[u8]) -> Result<DocumentFormat, ParseError> {
    let ext = filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str());

    match ext {
        Some(ext) => DocumentFormat::from_extension(ext)
            .ok_or_else(|| ParseError::UnsupportedFormat(format!(".{}", ext.to_ascii_lowercase()))),
        None => DocumentFormat::sniff(bytes)
            .ok_or_else(|| ParseError::UnsupportedFormat("unrecognized file content".to_string())),
    }
}

/// 解析发票文档
pub fn parse_document(
    bytes: &[u8],
    format: DocumentFormat,
    max_bytes: usize,
) -> Result<ParsedDocument, ParseError> {
    if bytes.len() > max_bytes {
        return Err(ParseError::PayloadTooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }
    if bytes.is_empty() {
        return Err(ParseError::UnreadableDocument("file is empty".to_string()));
    }

    let mut doc = match format {
        DocumentFormat::Xml => xml::parse(&decode_text(bytes))?,
        DocumentFormat::Txt => text::extract(&decode_text(bytes)),
        DocumentFormat::Pdf => text::extract(&extract::pdf_text(bytes)?),
        DocumentFormat::Docx => text::extract(&extract::docx_text(bytes)?),
        DocumentFormat::Doc => text::extract(&extract::legacy_doc_text(bytes)),
    };
    doc.format = Some(format);

    if doc.is_empty() {
        return Err(ParseError::UnreadableDocument(format!(
            "no header fields or line items found in {format} document"
        )));
    }

    tracing::debug!(
        format = %format,
        items = doc.items.len(),
        header_fields = doc.header.detected_fields(),
        "Document parsed"
    );
    Ok(doc)
}

fn decode_text(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.trim_start_matches('\u{feff}').to_string()
}
