// Copyright The dwarflint Authors
// SPDX-License-Identifier: Apache-2.0

//! Relocation matching in lock-step with section parsing.
//!
//! Each debug section's relocations are kept sorted by offset with a
//! monotone cursor. As the checkers consume bytes they ask the cursor
//! for a relocation at the current offset; entries that are skipped
//! over were either never referenced or sit mid-datum, both of which
//! are reportable. Queried offsets must never decrease — the cursor
//! does not rewind.

use crate::diag::{Cat, SecId, Sink, Where};
use crate::elf::{ElfData, RelSymbol, SymSec, SHF_ALLOC, SHF_EXECINSTR};

use object::SymbolIndex;

/// Whether the relocation table came from `SHT_REL` or `SHT_RELA`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelKind {
    /// Implicit addends, stored in the relocated bytes.
    Rel,
    /// Explicit addends.
    Rela,
}

impl RelKind {
    fn sec_id(self) -> SecId {
        match self {
            RelKind::Rel => SecId::Rel,
            RelKind::Rela => SecId::Rela,
        }
    }
}

/// One parsed relocation entry.
#[derive(Debug, Clone, Copy)]
pub struct Relocation {
    /// Offset into the relocated section.
    pub offset: u64,
    /// Width category of the relocation type, in bytes (4 or 8).
    pub width: usize,
    /// Symbol the relocation is formed against.
    pub symndx: Option<SymbolIndex>,
    /// Addend, explicit or read from the relocated bytes.
    pub addend: i64,
}

/// How to report relocations that the cursor passes over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// The skipped bytes were never referenced by the parse.
    Unref,
    /// The skipped relocation sits mid-datum.
    Mismatched,
    /// Silently drop skipped entries.
    Ok,
}

/// Sorted relocation list with the monotone matcher cursor.
#[derive(Debug, Default)]
pub struct RelocData {
    kind: Option<RelKind>,
    entries: Vec<Relocation>,
    index: usize,
}

impl RelocData {
    /// Table of entries sorted by offset.
    pub fn new(kind: RelKind, entries: Vec<Relocation>) -> RelocData {
        debug_assert!(entries.windows(2).all(|w| w[0].offset <= w[1].offset));
        RelocData {
            kind: Some(kind),
            entries,
            index: 0,
        }
    }

    /// True when the section has no relocations at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The pseudo-section id for breadcrumbs (`.rel` or `.rela`).
    pub fn sec_id(&self) -> SecId {
        self.kind.map(RelKind::sec_id).unwrap_or(SecId::Rel)
    }

    fn reloc_where(&self, index: usize, rel: &Relocation, wh: &Where) -> Where {
        let mut rw = Where::new_ref(self.sec_id(), wh);
        rw.reset_1(index as u64);
        rw.reset_2(rel.offset);
        rw
    }

    /// Advance past relocations below `offset` and return the one
    /// matching it exactly, if any. Entries passed over are reported
    /// according to `skip`. Offsets queried against one section must
    /// be non-decreasing.
    pub fn next(
        &mut self,
        offset: u64,
        wh: &Where,
        skip: Skip,
        sink: &mut Sink,
    ) -> Option<Relocation> {
        while self.index < self.entries.len() {
            let rel = self.entries[self.index];

            // This relocation entry is ahead of us.
            if rel.offset > offset {
                return None;
            }

            self.index += 1;

            if rel.offset < offset {
                if skip != Skip::Ok {
                    let rw = self.reloc_where(self.index - 1, &rel, wh);
                    let msg = match skip {
                        Skip::Unref => ": relocation targets unreferenced portion of the section.\n",
                        Skip::Mismatched => ": relocation is mismatched.\n",
                        Skip::Ok => unreachable!(),
                    };
                    sink.error(Some(&rw), format_args!("{msg}"));
                }
                continue;
            }

            return Some(rel);
        }

        None
    }

    /// Advance up to, but not including, `offset`, so that the next
    /// [`RelocData::next`] call can still match it.
    pub fn skip_to(&mut self, offset: u64, wh: &Where, skip: Skip, sink: &mut Sink) {
        if offset > 0 {
            self.next(offset - 1, wh, skip, sink);
        }
    }

    /// Drain the table, reporting every remaining entry as mismatched.
    /// Run after a section checks out, to catch relocations beyond the
    /// parsed area.
    pub fn skip_rest(&mut self, sec: SecId, sink: &mut Sink) {
        if !self.entries.is_empty() {
            self.next(u64::MAX, &Where::new(sec), Skip::Mismatched, sink);
        }
    }
}

/// What kind of datum a relocation is expected to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelTarget {
    /// An offset into a particular debug section.
    Sec(SecId),
    /// A target value; `SHN_ABS` or an allocated section.
    Value,
    /// An address; `SHN_UNDEF` and `SHN_COMMON` also pass.
    Address,
    /// A program-counter value; expected to target executable code.
    Exec,
    /// A datum that should not be relocated at all.
    Invalid,
}

/// Check one matched relocation against the datum it covers and, for
/// `ET_REL` files, apply it to `value`.
///
/// Returns the symbol the relocation was formed against, when the
/// symbol table is available.
pub fn relocate_one(
    file: &ElfData<'_>,
    reloc: &RelocData,
    rel: &Relocation,
    width: usize,
    value: &mut u64,
    wh: &Where,
    target: RelTarget,
    sink: &mut Sink,
) -> Option<RelSymbol> {
    let mut rw = Where::new_ref(reloc.sec_id(), wh);
    rw.reset_1(rel.offset);
    let mut ref_rw = rw.clone();
    ref_rw.next = Some(Box::new(wh.clone()));

    if target == RelTarget::Invalid {
        sink.message(
            Cat::IMPACT_3 | Cat::RELOC,
            Some(&ref_rw),
            format_args!(": relocates a datum that shouldn't be relocated.\n"),
        );
        return None;
    }

    if rel.width != width {
        sink.error(
            Some(&ref_rw),
            format_args!(
                ": {}-byte relocation relocates {}-byte datum.\n",
                rel.width, width
            ),
        );
    }

    // Tolerate a missing symbol table; plenty can be checked without.
    if !file.has_symtab() {
        return None;
    }

    let symndx = rel.symndx?;
    let Some(symbol) = file.symbol(symndx) else {
        sink.error(
            Some(&rw),
            format_args!(": couldn't obtain symbol #{}.\n", symndx.0),
        );
        return None;
    };

    // For ET_REL files section layout is synthesized here, and the
    // symbol table is not updated in the process. Section symbols are
    // therefore resolved through the section's computed address.
    let mut sym_value = symbol.value;
    if file.is_rel && symbol.is_section {
        if let SymSec::Section(ndx) = symbol.section {
            sym_value = file.sections.get(ndx).map(|s| s.addr).unwrap_or(0);
        }
    }

    match target {
        RelTarget::Value | RelTarget::Address | RelTarget::Exec => {
            let acceptable = symbol.section == SymSec::Abs
                || (target == RelTarget::Address
                    && matches!(symbol.section, SymSec::Undef | SymSec::Common));
            if !acceptable {
                if target != RelTarget::Address && symbol.section == SymSec::Undef {
                    sink.error(
                        Some(&rw),
                        format_args!(
                            ": relocation of an address is formed against SHN_UNDEF symbol \
                             (symtab index {}).\n",
                            symndx.0
                        ),
                    );
                } else if let SymSec::Section(ndx) = symbol.section {
                    if let Some(sec) = file.sections.get(ndx) {
                        if sec.flags & SHF_ALLOC == 0 {
                            sink.message(
                                Cat::RELOC | Cat::IMPACT_3,
                                Some(&rw),
                                format_args!(
                                    ": associated section {} isn't SHF_ALLOC.\n",
                                    sec.name
                                ),
                            );
                        }
                        if target == RelTarget::Exec && sec.flags & SHF_EXECINSTR == 0 {
                            // May still be kosher, but it's suspicious.
                            sink.message(
                                Cat::RELOC | Cat::IMPACT_2,
                                Some(&rw),
                                format_args!(
                                    ": relocation against {} is suspicious, \
                                     expected executable section.\n",
                                    sec.name
                                ),
                            );
                        }
                    }
                }
            }
        }

        RelTarget::Sec(expected) => match symbol.section {
            SymSec::Section(ndx) if ndx < file.sections.len() => {
                let id = file.sections[ndx].id;
                if id != Some(expected) {
                    let got = match id {
                        Some(id) => id.name(),
                        None => file.sections[ndx].name.as_str(),
                    };
                    sink.error(
                        Some(&rw),
                        format_args!(
                            ": relocation references section {}, but {} was expected.\n",
                            got,
                            expected.name()
                        ),
                    );
                }
            }
            SymSec::Section(ndx) => {
                sink.error(
                    Some(&rw),
                    format_args!(": invalid associated section #{ndx}.\n"),
                );
            }
            _ => {}
        },

        RelTarget::Invalid => unreachable!(),
    }

    // Only apply the relocation for ET_REL files; in linked files the
    // stored value is already final.
    if file.is_rel {
        *value = sym_value.wrapping_add_signed(rel.addend);
        if rel.width == 4 {
            *value &= u32::MAX as u64;
        }
    }

    Some(symbol)
}

/// Warn when the begin and end of an address range are relocated
/// against different sections.
pub fn check_range_relocations(
    cat: Cat,
    wh: &Where,
    file: &ElfData<'_>,
    begin: Option<RelSymbol>,
    end: Option<RelSymbol>,
    description: &str,
    sink: &mut Sink,
) {
    if let (Some(b), Some(e)) = (begin, end) {
        if b.section != e.section {
            sink.message(
                cat | Cat::IMPACT_2 | Cat::RELOC,
                Some(wh),
                format_args!(
                    ": {description} relocated against different sections ({} and {}).\n",
                    file.section_name(b.section),
                    file.section_name(e.section)
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(offsets: &[u64]) -> RelocData {
        RelocData::new(
            RelKind::Rela,
            offsets
                .iter()
                .map(|&offset| Relocation {
                    offset,
                    width: 4,
                    symndx: None,
                    addend: 0,
                })
                .collect(),
        )
    }

    #[test]
    fn cursor_is_monotone() {
        let mut rd = table(&[0x4, 0x8, 0x10]);
        let wh = Where::new(SecId::Info);
        let mut sink = Sink::default();

        assert!(rd.next(0x0, &wh, Skip::Ok, &mut sink).is_none());
        assert_eq!(rd.next(0x4, &wh, Skip::Ok, &mut sink).unwrap().offset, 0x4);
        // 0x8 is skipped over silently with Skip::Ok.
        assert_eq!(
            rd.next(0x10, &wh, Skip::Ok, &mut sink).unwrap().offset,
            0x10
        );
        assert!(rd.next(0x18, &wh, Skip::Ok, &mut sink).is_none());
        assert_eq!(sink.count, 0);
    }

    #[test]
    fn skipped_entries_are_reported() {
        let mut rd = table(&[0x4, 0x8]);
        let wh = Where::new(SecId::Info);
        let mut sink = Sink::default();

        assert!(rd.next(0xc, &wh, Skip::Mismatched, &mut sink).is_none());
        assert_eq!(sink.count, 2);
    }

    #[test]
    fn skip_to_preserves_exact_match() {
        let mut rd = table(&[0x4, 0x8]);
        let wh = Where::new(SecId::Info);
        let mut sink = Sink::default();

        rd.skip_to(0x8, &wh, Skip::Ok, &mut sink);
        assert_eq!(rd.next(0x8, &wh, Skip::Ok, &mut sink).unwrap().offset, 0x8);
    }

    #[test]
    fn skip_rest_drains() {
        let mut rd = table(&[0x4, 0x8]);
        let mut sink = Sink::default();
        rd.skip_rest(SecId::Info, &mut sink);
        assert_eq!(sink.count, 2);
        assert!(rd
            .next(u64::MAX, &Where::new(SecId::Info), Skip::Ok, &mut sink)
            .is_none());
    }
}
