//! 二进制格式转纯文本 (PDF / DOCX / 旧版 DOC)

use crate::error::ParseError;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};

/// 少于该长度的可打印片段视为噪声
const MIN_RUN_CHARS: usize = 4;

pub(crate) fn pdf_text(bytes: &[u8]) -> Result<String, ParseError> {
    // pdf-extract 遇到畸形文件可能 panic
    let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| ParseError::UnreadableDocument("PDF text extraction aborted".to_string()))?;

    match extracted {
        Ok(text) => {
            tracing::debug!(chars = text.len(), "PDF text extracted");
            Ok(text)
        }
        Err(e) => {
            tracing::warn!(error = %e, "pdf-extract failed, file may be scanned or corrupted");
            Err(ParseError::UnreadableDocument(format!("PDF: {e}")))
        }
    }
}

pub(crate) fn docx_text(bytes: &[u8]) -> Result<String, ParseError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ParseError::UnreadableDocument(format!("DOCX container: {e}")))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| ParseError::UnreadableDocument(format!("DOCX body: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| ParseError::UnreadableDocument(format!("DOCX body: {e}")))?;

    let mut reader = Reader::from_str(&xml);
    let mut out = String::new();
    let mut in_text = false;
    let mut cell_depth = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"tc" => cell_depth += 1,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" | b"cr" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                out.push_str(&e.unescape().unwrap_or_default());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" if cell_depth > 0 => out.push(' '),
                b"p" => out.push('\n'),
                b"tc" => {
                    cell_depth = cell_depth.saturating_sub(1);
                    out.push('\t');
                }
                b"tr" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ParseError::UnreadableDocument(format!("DOCX markup: {e}")));
            }
            _ => {}
        }
    }

    // 单元格分隔符转成空格, 便于按行抽取明细
    Ok(out
        .lines()
        .map(|line| line.split('\t').map(str::trim).filter(|c| !c.is_empty()).collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n"))
}

/// 旧版 Word (OLE) 不解析结构, 只捞出可打印的文本片段
///
/// 正文可能是 8 位编码也可能是 UTF-16LE, 两种都试, 取文本量大的那个。
pub(crate) fn legacy_doc_text(bytes: &[u8]) -> String {
    let narrow = printable_runs(bytes.iter().map(|b| char::from(*b)));
    let wide = printable_runs(
        bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .map(|unit| char::from_u32(u32::from(unit)).unwrap_or('\0')),
    );

    if wide.chars().count() > narrow.chars().count() {
        wide
    } else {
        narrow
    }
}

fn printable_runs(chars: impl Iterator<Item = char>) -> String {
    let mut out = String::new();
    let mut run = String::new();

    for c in chars {
        let printable = c == ' ' || c == '\t' || (!c.is_control() && !c.is_whitespace() && c != '\u{fffd}');
        if printable {
            run.push(c);
        } else {
            flush(&mut run, &mut out);
        }
    }
    flush(&mut run, &mut out);
    out
}

fn flush(run: &mut String, out: &mut String) {
    if run.trim().chars().count() >= MIN_RUN_CHARS {
        out.push_str(run.trim());
        out.push('\n');
    }
    run.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_with_body(body: &str) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn docx_paragraphs_and_table_rows() {
        let bytes = docx_with_body(
            "<w:p><w:r><w:t>Furnizor: Solar Distrib SRL</w:t></w:r></w:p>\
             <w:tbl><w:tr>\
               <w:tc><w:p><w:r><w:t>Panou fotovoltaic 450W</w:t></w:r></w:p></w:tc>\
               <w:tc><w:p><w:r><w:t>10</w:t></w:r></w:p></w:tc>\
               <w:tc><w:p><w:r><w:t>500,00</w:t></w:r></w:p></w:tc>\
               <w:tc><w:p><w:r><w:t>5000,00</w:t></w:r></w:p></w:tc>\
             </w:tr></w:tbl>",
        );
        let text = docx_text(&bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Furnizor: Solar Distrib SRL");
        assert_eq!(lines[1], "Panou fotovoltaic 450W 10 500,00 5000,00");
    }

    #[test]
    fn docx_without_body_is_unreadable() {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("readme.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"hello").unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        assert!(matches!(docx_text(&bytes), Err(ParseError::UnreadableDocument(_))));
        assert!(matches!(docx_text(b"not a zip"), Err(ParseError::UnreadableDocument(_))));
    }

    #[test]
    fn legacy_doc_prefers_wide_text() {
        let mut bytes = vec![0xD0, 0xCF, 0x11, 0xE0, 0x00, 0x01];
        for unit in "Factura nr. 77\rCablu solar 6mm 100 4,20 420,00\r".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let text = legacy_doc_text(&bytes);
        assert!(text.contains("Factura nr. 77"));
        assert!(text.contains("Cablu solar 6mm 100 4,20 420,00"));
    }
}
