use crate::charset::CharsetPartition;
use crate::error::FontSplitError;
use crate::glyph_report::CoverageReport;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Font container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontType {
    Ttf,
    Otf,
    Woff,
    Woff2,
    Eot,
    Svg,
}

impl FontType {
    pub const ALL: [FontType; 6] = [
        FontType::Ttf,
        FontType::Otf,
        FontType::Woff,
        FontType::Woff2,
        FontType::Eot,
        FontType::Svg,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            FontType::Ttf => "ttf",
            FontType::Otf => "otf",
            FontType::Woff => "woff",
            FontType::Woff2 => "woff2",
            FontType::Eot => "eot",
            FontType::Svg => "svg",
        }
    }

    /// Sniffs the container from the leading magic bytes.
    pub fn detect(data: &[u8]) -> Option<FontType> {
        let magic: [u8; 4] = data.get(..4)?.try_into().ok()?;
        match &magic {
            [0x00, 0x01, 0x00, 0x00] | [b't', b'r', b'u', b'e'] => Some(FontType::Ttf),
            [b'O', b'T', b'T', b'O'] => Some(FontType::Otf),
            [b'w', b'O', b'F', b'F'] => Some(FontType::Woff),
            [b'w', b'O', b'F', b'2'] => Some(FontType::Woff2),
            _ => None,
        }
    }

    fn is_sfnt(self) -> bool {
        matches!(self, FontType::Ttf | FontType::Otf)
    }
}

impl fmt::Display for FontType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for FontType {
    type Err = FontSplitError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lower = value.trim().to_ascii_lowercase();
        FontType::ALL
            .into_iter()
            .find(|t| t.extension() == lower)
            .ok_or_else(|| {
                FontSplitError::InvalidConfiguration(format!("unsupported font type {value:?}"))
            })
    }
}

/// Immutable source font bytes shared by every conversion task.
#[derive(Debug, Clone)]
pub struct FontBuffer {
    data: Arc<[u8]>,
    format: FontType,
}

impl FontBuffer {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, FontSplitError> {
        if data.get(..4) == Some(b"ttcf".as_slice()) {
            return Err(FontSplitError::Font(
                "font collections are not supported".to_string(),
            ));
        }
        let format = FontType::detect(&data)
            .ok_or_else(|| FontSplitError::Font("unrecognised font container".to_string()))?;
        Ok(Self {
            data: Arc::from(data),
            format,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, FontSplitError> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        Self::from_bytes(data).map_err(|err| match err {
            FontSplitError::Font(message) => {
                FontSplitError::Font(format!("{}: {}", path.display(), message))
            }
            other => other,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn format(&self) -> FontType {
        self.format
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Typographic family name from the `name` table, for sfnt sources.
    pub fn family_name(&self) -> Option<String> {
        if !self.format.is_sfnt() {
            return None;
        }
        let face = ttf_parser::Face::parse(&self.data, 0).ok()?;
        family_name(&face)
    }

    /// Restricts every category to codepoints the font maps to a glyph.
    pub fn filter_coverage(
        &self,
        partition: &CharsetPartition,
    ) -> Result<(CharsetPartition, CoverageReport), FontSplitError> {
        if !self.format.is_sfnt() {
            return Err(FontSplitError::Font(format!(
                "coverage filtering needs a ttf/otf source, got {}",
                self.format
            )));
        }
        let face = ttf_parser::Face::parse(&self.data, 0)
            .map_err(|err| FontSplitError::Font(format!("cannot parse source font: {err}")))?;
        let mut report = CoverageReport::default();
        let filtered = partition.map_sets(|category, set| {
            let (kept, dropped) = set.retain(|cp| {
                char::from_u32(cp)
                    .and_then(|ch| face.glyph_index(ch))
                    .is_some_and(|gid| gid.0 != 0)
            });
            report.record_missing(category, dropped);
            kept
        });
        Ok((filtered, report))
    }
}

fn family_name(face: &ttf_parser::Face<'_>) -> Option<String> {
    use ttf_parser::name::name_id;

    let mut typographic = None;
    let mut family = None;
    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY if typographic.is_none() => typographic = Some(name),
            name_id::FAMILY if family.is_none() => family = Some(name),
            _ => {}
        }
    }
    typographic.or(family)
}

#[cfg(test)]
pub(crate) mod test_font {
    /// Minimal TrueType font: head/hhea/maxp plus a format 12 cmap mapping
    /// each codepoint in `mapped` to its own glyph.
    pub(crate) fn build(mapped: &[u32]) -> Vec<u8> {
        build_named(mapped, &[])
    }

    /// Same as `build`, plus a Windows Unicode `name` table holding `names`.
    pub(crate) fn build_named(mapped: &[u32], names: &[(u16, &str)]) -> Vec<u8> {
        let mut cmap = Vec::new();
        push_u16(&mut cmap, 0);
        push_u16(&mut cmap, 1);
        push_u16(&mut cmap, 3);
        push_u16(&mut cmap, 10);
        push_u32(&mut cmap, 12);
        push_u16(&mut cmap, 12);
        push_u16(&mut cmap, 0);
        push_u32(&mut cmap, 16 + 12 * mapped.len() as u32);
        push_u32(&mut cmap, 0);
        push_u32(&mut cmap, mapped.len() as u32);
        let mut sorted = mapped.to_vec();
        sorted.sort_unstable();
        for (idx, cp) in sorted.iter().enumerate() {
            push_u32(&mut cmap, *cp);
            push_u32(&mut cmap, *cp);
            push_u32(&mut cmap, idx as u32 + 1);
        }

        let mut head = Vec::new();
        push_u32(&mut head, 0x0001_0000);
        push_u32(&mut head, 0x0001_0000);
        push_u32(&mut head, 0);
        push_u32(&mut head, 0x5F0F_3CF5);
        push_u16(&mut head, 0);
        push_u16(&mut head, 1000);
        head.extend_from_slice(&[0; 16]);
        for _ in 0..4 {
            push_u16(&mut head, 0);
        }
        push_u16(&mut head, 0);
        push_u16(&mut head, 8);
        push_u16(&mut head, 2);
        push_u16(&mut head, 0);
        push_u16(&mut head, 0);
        assert_eq!(head.len(), 54);

        let mut hhea = Vec::new();
        push_u32(&mut hhea, 0x0001_0000);
        push_u16(&mut hhea, 800);
        push_u16(&mut hhea, (-200i16) as u16);
        for _ in 0..13 {
            push_u16(&mut hhea, 0);
        }
        push_u16(&mut hhea, 1);
        assert_eq!(hhea.len(), 36);

        let mut maxp = Vec::new();
        push_u32(&mut maxp, 0x0000_5000);
        push_u16(&mut maxp, mapped.len() as u16 + 1);

        // Tags stay sorted; the parser binary-searches the table directory.
        let mut tables: Vec<(&[u8; 4], Vec<u8>)> =
            vec![(b"cmap", cmap), (b"head", head), (b"hhea", hhea), (b"maxp", maxp)];
        if !names.is_empty() {
            tables.push((b"name", name_table(names)));
        }
        let mut out = Vec::new();
        push_u32(&mut out, 0x0001_0000);
        push_u16(&mut out, tables.len() as u16);
        push_u16(&mut out, 64);
        push_u16(&mut out, 2);
        push_u16(&mut out, 0);
        let mut offset = 12 + 16 * tables.len() as u32;
        let mut body = Vec::new();
        for (tag, data) in &tables {
            out.extend_from_slice(*tag);
            push_u32(&mut out, 0);
            push_u32(&mut out, offset);
            push_u32(&mut out, data.len() as u32);
            body.extend_from_slice(data);
            while body.len() % 4 != 0 {
                body.push(0);
            }
            offset = 12 + 16 * tables.len() as u32 + body.len() as u32;
        }
        out.extend_from_slice(&body);
        out
    }

    fn name_table(names: &[(u16, &str)]) -> Vec<u8> {
        let mut records = Vec::new();
        let mut storage = Vec::new();
        for (name_id, text) in names {
            let encoded: Vec<u8> = text.encode_utf16().flat_map(u16::to_be_bytes).collect();
            push_u16(&mut records, 3);
            push_u16(&mut records, 1);
            push_u16(&mut records, 0x0409);
            push_u16(&mut records, *name_id);
            push_u16(&mut records, encoded.len() as u16);
            push_u16(&mut records, storage.len() as u16);
            storage.extend_from_slice(&encoded);
        }
        let mut table = Vec::new();
        push_u16(&mut table, 0);
        push_u16(&mut table, names.len() as u16);
        push_u16(&mut table, 6 + 12 * names.len() as u16);
        table.extend_from_slice(&records);
        table.extend_from_slice(&storage);
        table
    }

    fn push_u16(out: &mut Vec<u8>, value: u16) {
        out.extend_from_slice(&value.to_be_bytes());
    }

    fn push_u32(out: &mut Vec<u8>, value: u32) {
        out.extend_from_slice(&value.to_be_bytes());
    }
}
