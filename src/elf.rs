// Copyright The dwarflint Authors
// SPDX-License-Identifier: Apache-2.0

//! ELF container access for the structural checkers.
//!
//! This wraps the [`object`] library: section enumeration, debug
//! section loading (including zlib/zstd-compressed sections), symbol
//! lookup, and the raw relocation tables that the checkers consume in
//! lock-step with parsing. For `ET_REL` files a synthetic address
//! layout is computed for `SHF_ALLOC` sections, mirroring what
//! debuginfo consumers do before relocation processing.

use crate::diag::{Cat, SecId, Sink, Where};
use crate::reloc::{RelKind, RelocData, Relocation};
use crate::AnyError;

use std::io::Read as _;
use std::{fmt, fs, io, ops, path};

use flate2::read::ZlibDecoder;
use memmap2::Mmap;
use object::{
    CompressionFormat, Endianness, Object as _, ObjectSection as _, ObjectSymbol as _,
    RelocationFlags, RelocationTarget, SymbolIndex,
};
use zstd::stream::read::Decoder as ZstdDecoder;

/// Result type shorthand.
pub type Result<T = (), E = Error> = std::result::Result<T, E>;

/// Errors that can occur while opening and indexing an input file.
#[non_exhaustive]
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Sections are compressed in an unsupported format")]
    UnsupportedCompressionFormat,

    #[error("Section is too big to be loaded")]
    SectionTooBig,

    #[error("IO error")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Other(AnyError),
}

/// Conversion of [`object`] errors into ours, with type erasure.
///
/// We erase the type here to prevent leaking [`object`] library types
/// into our public interface.
impl From<object::Error> for Error {
    fn from(e: object::Error) -> Self {
        Self::Other(Box::new(e))
    }
}

/// ELF section flag bits used by the checkers.
pub const SHF_ALLOC: u64 = 0x2;
/// Section holds executable instructions.
pub const SHF_EXECINSTR: u64 = 0x4;

/// Maps an input file into memory.
pub struct File(Mmap);

impl File {
    /// Map the file at the given path into memory.
    pub fn load(path: &path::Path) -> Result<Self> {
        let file = fs::File::open(path)?;
        Ok(Self(unsafe { Mmap::map(&file)? }))
    }

    /// Parse the ELF header and build the section index.
    pub fn parse(&self, sink: &mut Sink) -> Result<ElfData<'_>> {
        ElfData::parse(&self.0[..], sink)
    }
}

/// Parse an in-memory image; [`File::parse`] for pre-loaded bytes.
pub fn parse_bytes<'data>(data: &'data [u8], sink: &mut Sink) -> Result<ElfData<'data>> {
    ElfData::parse(data, sink)
}

/// Storage for loaded section bytes.
///
/// Uncompressed sections borrow the underlying mapping; compressed
/// ones are inflated into memory.
pub enum SectionData<'data> {
    /// Section was uncompressed in the input file.
    Borrowed(&'data [u8]),

    /// Section was compressed and has been decompressed into memory.
    InMemory(Vec<u8>),
}

impl SectionData<'_> {
    fn load<'data>(sec: &object::Section<'data, '_>) -> Result<SectionData<'data>> {
        let data = sec.compressed_data()?;

        let final_size: usize = data
            .uncompressed_size
            .try_into()
            .map_err(|_| Error::SectionTooBig)?;

        let decoder: Box<dyn io::Read> = match data.format {
            CompressionFormat::Zlib => Box::new(ZlibDecoder::new(data.data)),
            CompressionFormat::Zstandard => Box::new(ZstdDecoder::new(data.data)?),
            CompressionFormat::None => return Ok(SectionData::Borrowed(data.data)),
            _ => return Err(Error::UnsupportedCompressionFormat),
        };

        let mut buf = Vec::with_capacity(final_size);
        decoder.take(final_size as u64).read_to_end(&mut buf)?;
        Ok(SectionData::InMemory(buf))
    }
}

impl ops::Deref for SectionData<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            SectionData::Borrowed(x) => x,
            SectionData::InMemory(x) => &x[..],
        }
    }
}

impl fmt::Debug for SectionData<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (storage, len) = match self {
            Self::Borrowed(x) => ("borrowed", x.len()),
            Self::InMemory(x) => ("in-memory", x.len()),
        };
        write!(f, "SectionData([{len} bytes, {storage}])")
    }
}

/// Header-level facts about one ELF section.
#[derive(Debug, Clone)]
pub struct Sec {
    /// Section name.
    pub name: String,
    /// Debug-section identity, if this is one of ours.
    pub id: Option<SecId>,
    /// `sh_addr`; synthetic for `ET_REL` after layout.
    pub addr: u64,
    /// `sh_size`.
    pub size: u64,
    /// `sh_flags`.
    pub flags: u64,
    /// `sh_addralign`.
    pub align: u64,
}

impl Sec {
    fn placeholder() -> Sec {
        Sec {
            name: String::new(),
            id: None,
            addr: 0,
            size: 0,
            flags: 0,
            align: 0,
        }
    }
}

/// A loaded debug section together with its relocation table.
#[derive(Debug)]
pub struct DebugSec<'data> {
    /// Which debug section this is.
    pub id: SecId,
    /// Index into [`ElfData::sections`].
    pub shndx: usize,
    /// The section bytes.
    pub data: SectionData<'data>,
    /// Parsed relocations sorted by offset, with the matcher cursor.
    pub rel: RelocData,
}

/// Which section a symbol is defined against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymSec {
    /// `SHN_ABS`.
    Abs,
    /// `SHN_UNDEF`.
    Undef,
    /// `SHN_COMMON`.
    Common,
    /// A regular section, by index.
    Section(usize),
    /// Anything the container layer could not classify.
    Unknown,
}

/// The parts of a symbol the relocation checks need.
#[derive(Debug, Clone, Copy)]
pub struct RelSymbol {
    /// `st_value`.
    pub value: u64,
    /// Owning section, derived from `st_shndx`.
    pub section: SymSec,
    /// True for `STT_SECTION` symbols.
    pub is_section: bool,
}

/// Parsed header data of one input file.
pub struct ElfData<'data> {
    obj: object::File<'data>,
    /// File byte order.
    pub endian: Endianness,
    /// True for `ELFCLASS64`.
    pub addr_64: bool,
    /// True for `ET_REL`.
    pub is_rel: bool,
    /// All sections, indexed by ELF section index (entry 0 unused).
    pub sections: Vec<Sec>,
    has_symtab: bool,
}

/// The debug sections the validator knows about.
const DEBUG_SECTIONS: &[(&str, SecId)] = &[
    (".debug_info", SecId::Info),
    (".debug_abbrev", SecId::Abbrev),
    (".debug_aranges", SecId::Aranges),
    (".debug_pubnames", SecId::Pubnames),
    (".debug_pubtypes", SecId::Pubtypes),
    (".debug_str", SecId::Str),
    (".debug_line", SecId::Line),
    (".debug_loc", SecId::Loc),
    (".debug_mac", SecId::Mac),
    (".debug_ranges", SecId::Ranges),
];

fn address_aligned(addr: u64, align: u64) -> bool {
    align < 2 || addr % align == 0
}

/// Assign synthetic addresses to `SHF_ALLOC` sections of an `ET_REL`
/// file: walk sections in order, aligning each start to the next
/// multiple of its `sh_addralign`.
fn layout_rel_sections(sections: &mut [Sec]) {
    let mut end = 0u64;
    for sec in sections.iter_mut().skip(1) {
        if sec.flags & SHF_ALLOC == 0 {
            continue;
        }
        let align = sec.align.max(1);
        let next = end.next_multiple_of(align);
        if sec.addr == 0 {
            sec.addr = next;
        }
        end = sec.addr + sec.size;
    }
}

/// True when a gap of `length` bytes ending at `start + length` can be
/// explained as alignment padding.
pub fn necessary_alignment(start: u64, length: u64, align: u64) -> bool {
    address_aligned(start + length, align) && length < align
}

impl<'data> ElfData<'data> {
    fn parse(data: &'data [u8], sink: &mut Sink) -> Result<Self> {
        let obj = object::File::parse(data)?;

        let endian = if obj.is_little_endian() {
            Endianness::Little
        } else {
            Endianness::Big
        };

        let mut file = ElfData {
            endian,
            addr_64: obj.is_64(),
            is_rel: obj.kind() == object::ObjectKind::Relocatable,
            sections: Vec::new(),
            has_symtab: obj.symbol_table().is_some(),
            obj,
        };

        for sec in file.obj.sections() {
            let idx = sec.index().0;
            if file.sections.len() <= idx {
                file.sections.resize_with(idx + 1, Sec::placeholder);
            }

            let name = String::from_utf8_lossy(sec.name_bytes()?).into_owned();
            let flags = match sec.flags() {
                object::SectionFlags::Elf { sh_flags } => sh_flags,
                _ => 0,
            };

            if !address_aligned(sec.address(), sec.align()) {
                sink.error(
                    None,
                    format_args!(
                        "Base address of section {}, {:#x}, should have an alignment of {}.\n",
                        name,
                        sec.address(),
                        sec.align()
                    ),
                );
            }

            file.sections[idx] = Sec {
                id: DEBUG_SECTIONS
                    .iter()
                    .find(|(n, _)| *n == name)
                    .map(|&(_, id)| id),
                name,
                addr: sec.address(),
                size: sec.size(),
                flags,
                align: sec.align(),
            };
        }

        if file.is_rel {
            layout_rel_sections(&mut file.sections);
        }

        Ok(file)
    }

    /// Load every recognized debug section, together with its
    /// relocation table.
    ///
    /// Structural complaints about the section table itself (duplicate
    /// debug sections, relocations against `.debug_str`, relocation
    /// sections without data to relocate) are reported here.
    pub fn load_debug_sections(&self, sink: &mut Sink) -> Result<Vec<DebugSec<'data>>> {
        let mut out: Vec<DebugSec<'data>> = Vec::new();

        for sec in self.obj.sections() {
            let name = sec.name_bytes()?;
            let Some(&(_, id)) = DEBUG_SECTIONS
                .iter()
                .find(|(n, _)| n.as_bytes() == name)
            else {
                continue;
            };

            if out.iter().any(|d| d.id == id) {
                sink.error(
                    None,
                    format_args!(
                        "Multiple occurrences of section {}.\n",
                        String::from_utf8_lossy(name)
                    ),
                );
                continue;
            }

            let data = SectionData::load(&sec)?;
            let rel = self.read_rel(&sec, id, &data, sink);

            if !rel.is_empty() && id == SecId::Str {
                sink.message(
                    Cat::IMPACT_2 | Cat::ELF,
                    Some(&Where::new(SecId::Str)),
                    format_args!(": there's a relocation section associated with this section.\n"),
                );
            }

            out.push(DebugSec {
                id,
                shndx: sec.index().0,
                data,
                rel,
            });
        }

        Ok(out)
    }

    /// Read and validate the relocation entries attached to a debug
    /// section, sorted by offset.
    fn read_rel(
        &self,
        sec: &object::Section<'data, '_>,
        id: SecId,
        data: &SectionData<'data>,
        sink: &mut Sink,
    ) -> RelocData {
        let mut kind = RelKind::Rela;
        let mut entries = Vec::new();

        let parent = Where::new(id);

        for (i, (offset, reloc)) in sec.relocations().enumerate() {
            let mut wh = Where::new_ref(
                if reloc.has_implicit_addend() {
                    SecId::Rel
                } else {
                    SecId::Rela
                },
                &parent,
            );
            wh.reset_1(i as u64);
            wh.reset_2(offset);

            if reloc.has_implicit_addend() {
                kind = RelKind::Rel;
            }

            let r_type = match reloc.flags() {
                RelocationFlags::Elf { r_type } => r_type,
                _ => 0,
            };
            if r_type == 0 {
                sink.message(
                    Cat::IMPACT_3 | Cat::RELOC | Cat::BLOAT,
                    Some(&wh),
                    format_args!(": NONE relocation is superfluous.\n"),
                );
                continue;
            }

            let width = match reloc.size() {
                32 => 4,
                64 => 8,
                8 | 16 => {
                    sink.error(
                        Some(&wh),
                        format_args!(": 8 or 16-bit relocation type {r_type}.\n"),
                    );
                    continue;
                }
                _ => {
                    sink.error(Some(&wh), format_args!(": invalid relocation {r_type}.\n"));
                    continue;
                }
            };

            if offset + width as u64 > data.len() as u64 {
                sink.error(
                    Some(&wh),
                    format_args!(": relocation doesn't fall into relocated section.\n"),
                );
                continue;
            }

            let symndx = match reloc.target() {
                RelocationTarget::Symbol(idx) => Some(idx),
                _ => None,
            };

            // The bytes being relocated. REL stores the addend there;
            // under RELA they are expected to be zero.
            let mut raw = [0u8; 8];
            raw[..width].copy_from_slice(&data[offset as usize..offset as usize + width]);
            let in_place = match self.endian {
                Endianness::Little => u64::from_le_bytes(raw),
                Endianness::Big => {
                    let mut v = 0u64;
                    for b in &data[offset as usize..offset as usize + width] {
                        v = v << 8 | u64::from(*b);
                    }
                    v
                }
            };

            let addend = if reloc.has_implicit_addend() {
                in_place as i64
            } else {
                if in_place != 0 {
                    sink.message(
                        Cat::IMPACT_2 | Cat::RELOC,
                        Some(&wh),
                        format_args!(
                            ": SHT_RELA relocates a place with non-zero value \
                             (addend={:#x}, value={in_place:#x}).\n",
                            reloc.addend()
                        ),
                    );
                }
                reloc.addend()
            };

            entries.push(Relocation {
                offset,
                width,
                symndx,
                addend,
            });
        }

        entries.sort_by_key(|r| r.offset);
        RelocData::new(kind, entries)
    }

    /// True when a symbol table is available for relocation checking.
    pub fn has_symtab(&self) -> bool {
        self.has_symtab
    }

    /// Raw bytes of section `shndx`, when it carries any.
    pub fn section_data(&self, shndx: usize) -> Option<&'data [u8]> {
        let sec = self.obj.section_by_index(object::SectionIndex(shndx)).ok()?;
        sec.data().ok()
    }

    /// Fetch the parts of symbol `idx` that relocation checking needs.
    pub fn symbol(&self, idx: SymbolIndex) -> Option<RelSymbol> {
        let sym = self.obj.symbol_by_index(idx).ok()?;
        let section = match sym.section() {
            object::SymbolSection::Absolute => SymSec::Abs,
            object::SymbolSection::Undefined => SymSec::Undef,
            object::SymbolSection::Common => SymSec::Common,
            object::SymbolSection::Section(i) => SymSec::Section(i.0),
            _ => SymSec::Unknown,
        };
        Some(RelSymbol {
            value: sym.address(),
            section,
            is_section: sym.kind() == object::SymbolKind::Section,
        })
    }

    /// Name of the section a symbol lives in, for diagnostics.
    pub fn section_name(&self, section: SymSec) -> &str {
        match section {
            SymSec::Abs => "SHN_ABS",
            SymSec::Undef => "SHN_UNDEF",
            SymSec::Common => "SHN_COMMON",
            SymSec::Unknown => "<unknown>",
            SymSec::Section(i) => self
                .sections
                .get(i)
                .map(|s| s.name.as_str())
                .unwrap_or("<bad index>"),
        }
    }
}

impl fmt::Debug for ElfData<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ElfData({} sections, {}, {})",
            self.sections.len(),
            if self.addr_64 { "ELF64" } else { "ELF32" },
            if self.is_rel { "ET_REL" } else { "linked" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_padding() {
        // A 3-byte gap that brings the cursor to an 8-byte boundary.
        assert!(necessary_alignment(0x15, 3, 8));
        // Gap as long as the alignment unit is not padding.
        assert!(!necessary_alignment(0x10, 8, 8));
        // Misaligned end.
        assert!(!necessary_alignment(0x15, 2, 8));
        // Alignment of 0/1 never needs padding.
        assert!(!necessary_alignment(0x15, 3, 1));
    }

    fn alloc_sec(size: u64, align: u64) -> Sec {
        Sec {
            name: String::new(),
            id: None,
            addr: 0,
            size,
            flags: SHF_ALLOC,
            align,
        }
    }

    #[test]
    fn rel_layout() {
        let mut sections = vec![
            Sec::placeholder(), // null entry
            alloc_sec(0x13, 4),
            Sec::placeholder(), // non-ALLOC, skipped
            alloc_sec(0x08, 16),
            alloc_sec(0x01, 0),
        ];
        layout_rel_sections(&mut sections);

        assert_eq!(sections[1].addr, 0x00);
        assert_eq!(sections[2].addr, 0);
        assert_eq!(sections[3].addr, 0x20); // 0x13 rounded up to 16
        assert_eq!(sections[4].addr, 0x28);
    }
}
