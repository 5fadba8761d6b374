//! The self-describing metadata block at the head of every archive:
//! contigs, samples, INFO/FORMAT/FILTER descriptors and free-form literal
//! lines, serialized as UTF-8 text and stored compressed behind the file
//! magic.

use std::collections::HashMap;
use std::io::{Read, Write};

use strata_base::{ByteBuffer, Error, Result};
use strata_codec::{codec, CodecId};

use crate::magic;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ContigDescriptor {
    pub id: u32,
    pub name: String,
    pub length: u64,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FieldType {
    Flag,
    Integer,
    Float,
    String,
}

impl FieldType {
    fn as_str(self) -> &'static str {
        match self {
            FieldType::Flag => "Flag",
            FieldType::Integer => "Integer",
            FieldType::Float => "Float",
            FieldType::String => "String",
        }
    }

    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "Flag" => Ok(FieldType::Flag),
            "Integer" => Ok(FieldType::Integer),
            "Float" => Ok(FieldType::Float),
            "String" => Ok(FieldType::String),
            other => Err(Error::version(format!("unknown field type {other}"))),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FieldDescriptor {
    /// Global id; the key space is per descriptor kind.
    pub id: u32,
    pub name: String,
    pub ty: FieldType,
}

#[derive(Clone, Default, PartialEq, Debug)]
pub struct ArchiveHeader {
    pub contigs: Vec<ContigDescriptor>,
    pub samples: Vec<String>,
    pub info: Vec<FieldDescriptor>,
    pub format: Vec<FieldDescriptor>,
    pub filter: Vec<FieldDescriptor>,
    pub literals: Vec<String>,

    contig_by_name: HashMap<String, u32>,
    info_by_id: HashMap<u32, usize>,
    format_by_id: HashMap<u32, usize>,
    filter_by_id: HashMap<u32, usize>,
}

impl ArchiveHeader {
    pub fn new() -> Self {
        ArchiveHeader::default()
    }

    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn add_contig(&mut self, name: impl Into<String>, length: u64) -> u32 {
        let id = self.contigs.len() as u32;
        let name = name.into();
        self.contig_by_name.insert(name.clone(), id);
        self.contigs.push(ContigDescriptor { id, name, length });
        id
    }

    pub fn add_sample(&mut self, name: impl Into<String>) {
        self.samples.push(name.into());
    }

    pub fn add_info(&mut self, name: impl Into<String>, ty: FieldType) -> u32 {
        let id = self.info.len() as u32;
        self.info_by_id.insert(id, self.info.len());
        self.info.push(FieldDescriptor {
            id,
            name: name.into(),
            ty,
        });
        id
    }

    pub fn add_format(&mut self, name: impl Into<String>, ty: FieldType) -> u32 {
        let id = self.format.len() as u32;
        self.format_by_id.insert(id, self.format.len());
        self.format.push(FieldDescriptor {
            id,
            name: name.into(),
            ty,
        });
        id
    }

    pub fn add_filter(&mut self, name: impl Into<String>) -> u32 {
        let id = self.filter.len() as u32;
        self.filter_by_id.insert(id, self.filter.len());
        self.filter.push(FieldDescriptor {
            id,
            name: name.into(),
            ty: FieldType::Flag,
        });
        id
    }

    pub fn add_literal(&mut self, line: impl Into<String>) {
        self.literals.push(line.into());
    }

    /// Provenance literals recorded at import time.
    pub fn stamp_import(&mut self, settings_summary: &str) {
        self.add_literal(format!(
            "strata_importVersion=strata-{}",
            magic::version_string()
        ));
        self.add_literal(format!("strata_importSettings={settings_summary}"));
    }

    pub fn contig(&self, id: i32) -> Option<&ContigDescriptor> {
        if id < 0 {
            return None;
        }
        self.contigs.get(id as usize)
    }

    pub fn contig_id(&self, name: &str) -> Option<u32> {
        self.contig_by_name.get(name).copied()
    }

    pub fn info_field(&self, key: u32) -> Option<&FieldDescriptor> {
        self.info_by_id.get(&key).map(|&i| &self.info[i])
    }

    pub fn format_field(&self, key: u32) -> Option<&FieldDescriptor> {
        self.format_by_id.get(&key).map(|&i| &self.format[i])
    }

    pub fn filter_field(&self, key: u32) -> Option<&FieldDescriptor> {
        self.filter_by_id.get(&key).map(|&i| &self.filter[i])
    }

    fn to_text(&self) -> String {
        let mut text = String::new();
        text.push_str(&format!("##strata_version={}\n", magic::version_string()));
        for c in &self.contigs {
            text.push_str(&format!(
                "##contig=<ID={},length={},idx={}>\n",
                c.name, c.length, c.id
            ));
        }
        for f in &self.info {
            text.push_str(&format!(
                "##INFO=<ID={},Type={},idx={}>\n",
                f.name,
                f.ty.as_str(),
                f.id
            ));
        }
        for f in &self.format {
            text.push_str(&format!(
                "##FORMAT=<ID={},Type={},idx={}>\n",
                f.name,
                f.ty.as_str(),
                f.id
            ));
        }
        for f in &self.filter {
            text.push_str(&format!("##FILTER=<ID={},idx={}>\n", f.name, f.id));
        }
        for l in &self.literals {
            text.push_str(&format!("##{l}\n"));
        }
        text.push_str("#SAMPLES");
        for s in &self.samples {
            text.push('\t');
            text.push_str(s);
        }
        text.push('\n');
        text
    }

    fn from_text(text: &str) -> Result<Self> {
        let mut header = ArchiveHeader::new();
        let bytes = text.as_bytes();
        let mut start = 0usize;
        while start < bytes.len() {
            let end = memchr::memchr(b'\n', &bytes[start..])
                .map(|i| start + i)
                .unwrap_or(bytes.len());
            let line = &text[start..end];
            start = end + 1;
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix("##contig=") {
                let attrs = parse_attrs(rest)?;
                header.add_contig(
                    attr(&attrs, "ID")?,
                    attr(&attrs, "length")?.parse().map_err(|_| {
                        Error::version("contig length is not an integer")
                    })?,
                );
            } else if let Some(rest) = line.strip_prefix("##INFO=") {
                let attrs = parse_attrs(rest)?;
                header.add_info(attr(&attrs, "ID")?, FieldType::parse(&attr(&attrs, "Type")?)?);
            } else if let Some(rest) = line.strip_prefix("##FORMAT=") {
                let attrs = parse_attrs(rest)?;
                header.add_format(attr(&attrs, "ID")?, FieldType::parse(&attr(&attrs, "Type")?)?);
            } else if let Some(rest) = line.strip_prefix("##FILTER=") {
                let attrs = parse_attrs(rest)?;
                header.add_filter(attr(&attrs, "ID")?);
            } else if line.starts_with("##strata_version=") {
                // Informational only; the binary magic gates versions.
            } else if let Some(rest) = line.strip_prefix("##") {
                header.add_literal(rest);
            } else if let Some(rest) = line.strip_prefix("#SAMPLES") {
                for s in rest.split('\t').filter(|s| !s.is_empty()) {
                    header.add_sample(s);
                }
            } else {
                return Err(Error::version(format!("unparseable header line: {line}")));
            }
        }
        Ok(header)
    }

    /// 4-byte uncompressed length, 4-byte compressed length, compressed
    /// payload.
    pub fn write_to(&self, sink: &mut impl Write, level: i32) -> Result<()> {
        let text = self.to_text();
        let mut packed = Vec::new();
        codec(CodecId::Zstd).compress(text.as_bytes(), &mut packed, level)?;
        let mut buf = ByteBuffer::with_capacity(8 + packed.len());
        buf.put(text.len() as u32);
        buf.put(packed.len() as u32);
        buf.put_bytes(&packed);
        sink.write_all(buf.as_slice())?;
        Ok(())
    }

    pub fn read_from(source: &mut impl Read) -> Result<Self> {
        let mut lengths = [0u8; 8];
        source.read_exact(&mut lengths)?;
        let u_len = u32::from_le_bytes([lengths[0], lengths[1], lengths[2], lengths[3]]) as usize;
        let c_len = u32::from_le_bytes([lengths[4], lengths[5], lengths[6], lengths[7]]) as usize;
        let mut packed = vec![0u8; c_len];
        source.read_exact(&mut packed)?;
        let mut text = Vec::new();
        codec(CodecId::Zstd).decompress(&packed, &mut text, u_len)?;
        let text = String::from_utf8(text)
            .map_err(|_| Error::version("archive header is not valid utf-8"))?;
        Self::from_text(&text)
    }
}

fn parse_attrs(raw: &str) -> Result<Vec<(String, String)>> {
    let inner = raw
        .strip_prefix('<')
        .and_then(|r| r.strip_suffix('>'))
        .ok_or_else(|| Error::version("header attribute list is not angle-bracketed"))?;
    let mut attrs = Vec::new();
    for piece in inner.split(',') {
        let (key, val) = piece
            .split_once('=')
            .ok_or_else(|| Error::version("header attribute without '='"))?;
        attrs.push((key.to_owned(), val.to_owned()));
    }
    Ok(attrs)
}

fn attr(attrs: &[(String, String)], key: &str) -> Result<String> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
        .ok_or_else(|| Error::version(format!("header attribute {key} missing")))
}
