// Copyright The dwarflint Authors
// SPDX-License-Identifier: Apache-2.0

//! Structural validation of `.debug_info`.
//!
//! Walks the section CU by CU and DIE by DIE, decoding every attribute
//! value according to its abbreviation, keeping the relocation cursor
//! in lock-step, and recording the bookkeeping that later passes need:
//! DIE start offsets, intra- and inter-CU references, loc/range/line
//! pointers, and the address ranges covered by CU DIEs.

#![allow(non_upper_case_globals)]

use crate::abbrev::{self, Abbrev, AbbrevChain, AbbrevTable};
use crate::coverage::Coverage;
use crate::diag::{self, Cat, SecId, Sink, Where};
use crate::elf::{DebugSec, ElfData, RelSymbol};
use crate::locexpr;
use crate::readctx::ReadCtx;
use crate::records::{AddrRecord, RefRecord};
use crate::reloc::{check_range_relocations, relocate_one, RelTarget, RelocData, Skip};

use gimli::constants::*;

/// Unrecoverable parse failure within a CU; the section check bails.
#[derive(Debug, thiserror::Error)]
#[error(".debug_info is structurally unusable")]
pub struct Bail;

/// Result of walking one sibling chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    /// The chain held only its terminating zero entry.
    Empty,
    /// At least one DIE was loaded.
    Loaded,
}

/// One compile unit, frozen after its DIE chain has been walked.
#[derive(Debug)]
pub struct Cu {
    /// Section offset of the CU header.
    pub offset: u64,
    /// Section offset of the CU DIE.
    pub cudie_offset: u64,
    /// CU length including the initial length field.
    pub length: u64,
    /// Address size on the target machine, 4 or 8.
    pub address_size: usize,
    /// `DW_AT_low_pc` of the CU DIE, when present.
    pub low_pc: Option<u64>,
    /// Offsets at which DIEs begin in this CU.
    pub die_addrs: AddrRecord,
    /// Global (cross-CU) DIE references made from this CU.
    pub die_refs: RefRecord,
    /// References into `.debug_loc`.
    pub loc_refs: RefRecord,
    /// References into `.debug_ranges`.
    pub range_refs: RefRecord,
    /// References into `.debug_line`.
    pub line_refs: RefRecord,
    /// Breadcrumb of the CU header.
    pub wh: Where,
    /// Whether an aranges table referring to this CU has been seen.
    pub has_arange: bool,
    /// Likewise for pubnames.
    pub has_pubnames: bool,
    /// Likewise for pubtypes.
    pub has_pubtypes: bool,
}

/// Address coverage accumulated from CU DIEs.
#[derive(Debug, Default)]
pub struct CuCoverage {
    /// Ranges covered via `low_pc`/`high_pc` pairs and, once the
    /// ranges checker ran, via `DW_AT_ranges`.
    pub cov: Coverage,
    /// Set when some CU referenced `.debug_ranges`; cleared once that
    /// section's contents have been fused into `cov`.
    pub need_ranges: bool,
}

/// Find the CU starting at `offset`.
pub fn find_cu(cus: &[Cu], offset: u64) -> Option<&Cu> {
    cus.iter().find(|cu| cu.offset == offset)
}

/// Find the CU starting at `offset`, mutably.
pub fn find_cu_mut(cus: &mut [Cu], offset: u64) -> Option<&mut Cu> {
    cus.iter_mut().find(|cu| cu.offset == offset)
}

/// Which pointer class a `data4`/`data8` attribute value is, by
/// attribute name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PtrCheck {
    Nothing,
    Loc,
    Line,
    Range,
}

impl PtrCheck {
    fn cat(self) -> Cat {
        match self {
            PtrCheck::Nothing => Cat::NONE,
            PtrCheck::Loc => Cat::LOC,
            PtrCheck::Line => Cat::LINE,
            PtrCheck::Range => Cat::RANGES,
        }
    }
}

/// Section class a relocation on an attribute datum must target.
fn reloc_target(form: DwForm, name: DwAt) -> RelTarget {
    match form {
        DW_FORM_strp => RelTarget::Sec(SecId::Str),

        DW_FORM_addr => match name {
            DW_AT_low_pc | DW_AT_high_pc | DW_AT_entry_pc => RelTarget::Exec,
            // Appears in some kernel modules. Not allowed by the
            // standard, but that is for the high-level checks to flag.
            DW_AT_const_value => RelTarget::Address,
            _ => RelTarget::Value,
        },

        DW_FORM_ref_addr => RelTarget::Sec(SecId::Info),

        // Technically legal, but never used in practice; flag it.
        DW_FORM_data1 | DW_FORM_data2 => RelTarget::Invalid,

        DW_FORM_data4 | DW_FORM_data8 => match name {
            DW_AT_stmt_list => RelTarget::Sec(SecId::Line),
            DW_AT_location
            | DW_AT_string_length
            | DW_AT_return_addr
            | DW_AT_data_member_location
            | DW_AT_frame_base
            | DW_AT_segment
            | DW_AT_static_link
            | DW_AT_use_location
            | DW_AT_vtable_elem_location => RelTarget::Sec(SecId::Loc),
            DW_AT_macro_info => RelTarget::Sec(SecId::Mac),
            DW_AT_ranges => RelTarget::Sec(SecId::Ranges),
            _ => RelTarget::Value,
        },

        DW_FORM_string | DW_FORM_ref1 | DW_FORM_ref2 | DW_FORM_ref4 => RelTarget::Invalid,

        _ => RelTarget::Value,
    }
}

/// Per-CU walker state, threaded through the recursive chain walk.
struct DieWalker<'a, 'data> {
    file: &'a ElfData<'data>,
    cu: &'a mut Cu,
    cu_len: u64,
    abbrevs: &'a AbbrevTable,
    strings: Option<&'a [u8]>,
    dwarf_64: bool,
    addr_64: bool,
    local_die_refs: &'a mut RefRecord,
    strings_coverage: Option<&'a mut Coverage>,
    reloc: Option<&'a mut RelocData>,
    cu_cov: &'a mut CuCoverage,
    sink: &'a mut Sink,
}

impl DieWalker<'_, '_> {
    /// Record a DIE reference. CU-local references are rebased onto
    /// section offsets; global ones go to the CU's cross-CU list.
    fn record_ref(&mut self, addr: u64, who: &Where, local: bool) {
        if local {
            if addr > self.cu_len {
                self.sink.error(
                    Some(who),
                    format_args!(": invalid reference outside the CU: {addr:#x}.\n"),
                );
                return;
            }
            self.local_die_refs.add(addr + self.cu.offset, who);
        } else {
            self.cu.die_refs.add(addr, who);
        }
    }

    fn check_ptr(&mut self, what: PtrCheck, value: u64, who: &Where) {
        if what == PtrCheck::Range && value % self.cu.address_size as u64 != 0 {
            self.sink.message(
                Cat::RANGES | Cat::IMPACT_2,
                Some(who),
                format_args!(": rangeptr value {value:#x} not aligned to CU address size.\n"),
            );
        }

        match what {
            PtrCheck::Range => {
                self.cu_cov.need_ranges = true;
                self.cu.range_refs.add(value, who);
            }
            PtrCheck::Line => self.cu.line_refs.add(value, who),
            PtrCheck::Loc => self.cu.loc_refs.add(value, who),
            PtrCheck::Nothing => {}
        }
    }

    fn reloc_next(&mut self, offset: u64, wh: &Where) -> Option<crate::reloc::Relocation> {
        match self.reloc.as_deref_mut() {
            Some(r) => r.next(offset, wh, Skip::Mismatched, self.sink),
            None => None,
        }
    }

    /// Walk one sibling chain, recursing into children.
    fn walk_chain(&mut self, ctx: &mut ReadCtx<'_>) -> Result<Walk, Bail> {
        let mut got_die = false;
        let mut sibling_addr: Option<u64> = None;
        let mut prev_abbrev: Option<&Abbrev> = None;
        let mut wh = self.cu.wh.clone();

        while !ctx.eof() {
            wh = self.cu.wh.clone();
            let die_off = ctx.offset();
            wh.reset_2(die_off + self.cu.offset);

            let Some(abbr_code) = diag::checked_uleb128(ctx, self.sink, &wh, "abbrev code")
            else {
                return Err(Bail);
            };

            // Check the sibling value advertised last time through.
            if let Some(sib) = sibling_addr.take() {
                if abbr_code == 0 {
                    self.sink.error(
                        Some(&wh),
                        format_args!(
                            ": is the last sibling in chain, but has a DW_AT_sibling attribute.\n"
                        ),
                    );
                } else if sib != die_off {
                    self.sink.error(
                        Some(&wh),
                        format_args!(
                            ": This DIE should have had its sibling at {sib:#x}, \
                             but it's at {die_off:#x} instead.\n"
                        ),
                    );
                }
            } else if prev_abbrev.is_some_and(|a| a.has_children) {
                // Even a DIE with children legitimately lacks the
                // attribute when it is the last in its chain, so this
                // cannot be checked during abbrev loading.
                self.sink.message(
                    Cat::DIE_REL | Cat::BLOAT | Cat::SUBOPTIMAL | Cat::IMPACT_3,
                    Some(&wh),
                    format_args!(": This DIE had children, but no DW_AT_sibling attribute.\n"),
                );
            }

            // The chain ended.
            if abbr_code == 0 {
                break;
            }
            if ctx.eof() {
                self.sink.error(
                    Some(&wh),
                    format_args!(": DIE chain not terminated with DIE with zero abbrev code.\n"),
                );
                break;
            }

            got_die = true;

            let Some(abbrev) = self.abbrevs.find(abbr_code) else {
                self.sink.error(
                    Some(&wh),
                    format_args!(
                        ": abbrev section at {:#x} doesn't contain code {abbr_code}.\n",
                        self.abbrevs.offset
                    ),
                );
                return Err(Bail);
            };
            abbrev.used.set(true);
            prev_abbrev = Some(abbrev);

            self.cu.die_addrs.add(self.cu.offset + die_off);

            let mut low_pc: Option<u64> = None;
            let mut high_pc: Option<u64> = None;
            let mut low_pc_relocated = false;
            let mut high_pc_relocated = false;
            let mut low_pc_symbol: Option<RelSymbol> = None;
            let mut high_pc_symbol: Option<RelSymbol> = None;

            for it in &abbrev.attribs {
                wh.reference = Some(Box::new(it.wh.clone()));

                let mut form = it.form;
                let indirect = form == DW_FORM_indirect;
                if indirect {
                    let Some(value) =
                        diag::checked_uleb128(ctx, self.sink, &wh, "indirect attribute form")
                    else {
                        return Err(Bail);
                    };
                    if !(value > 0 && value <= DW_FORM_indirect.0 as u64) {
                        self.sink.error(
                            Some(&wh),
                            format_args!(": invalid indirect form {value:#x}.\n"),
                        );
                        return Err(Bail);
                    }
                    form = DwForm(value as u16);

                    if it.name == DW_AT_sibling {
                        match form {
                            DW_FORM_ref1 | DW_FORM_ref2 | DW_FORM_ref4 | DW_FORM_ref8
                            | DW_FORM_ref_udata | DW_FORM_indirect => {}
                            DW_FORM_ref_addr => self.sink.message(
                                Cat::DIE_REL | Cat::IMPACT_2,
                                Some(&wh),
                                format_args!(
                                    ": DW_AT_sibling attribute with (indirect) form \
                                     DW_FORM_ref_addr.\n"
                                ),
                            ),
                            _ => self.sink.error(
                                Some(&wh),
                                format_args!(
                                    ": DW_AT_sibling attribute with non-reference \
                                     (indirect) form \"{form}\".\n"
                                ),
                            ),
                        }
                    }
                }

                // Classify loc/line/range pointers up front; the value
                // arms below record them.
                let mut ptr = PtrCheck::Nothing;
                if abbrev::is_location_attrib(it.name) {
                    match form {
                        DW_FORM_data4 | DW_FORM_data8 => {
                            if form == DW_FORM_data8 && !self.dwarf_64 {
                                self.sink.error(
                                    Some(&wh),
                                    format_args!(
                                        ": location attribute with form \"{form}\" \
                                         in 32-bit CU.\n"
                                    ),
                                );
                            }
                            ptr = PtrCheck::Loc;
                        }
                        DW_FORM_block1 | DW_FORM_block2 | DW_FORM_block4 | DW_FORM_block => {}
                        _ => {
                            // Non-indirect mismatches were already
                            // diagnosed when the abbrev was loaded.
                            if indirect {
                                self.sink.error(
                                    Some(&wh),
                                    format_args!(
                                        ": location attribute with invalid (indirect) \
                                         form \"{form}\".\n"
                                    ),
                                );
                            }
                        }
                    }
                } else if it.name == DW_AT_ranges || it.name == DW_AT_stmt_list {
                    match form {
                        DW_FORM_data4 | DW_FORM_data8 => {
                            if form == DW_FORM_data8 && !self.dwarf_64 {
                                self.sink.error(
                                    Some(&wh),
                                    format_args!(
                                        ": {} with form DW_FORM_data8 in 32-bit CU.\n",
                                        it.name
                                    ),
                                );
                            }
                            ptr = if it.name == DW_AT_ranges {
                                PtrCheck::Range
                            } else {
                                PtrCheck::Line
                            };
                        }
                        _ => {
                            if indirect {
                                self.sink.error(
                                    Some(&wh),
                                    format_args!(
                                        ": {} with invalid (indirect) form \"{form}\".\n",
                                        it.name
                                    ),
                                );
                            }
                        }
                    }
                }

                let ctx_offset = ctx.offset() + self.cu.offset;
                let type_is_rel = self.file.is_rel;

                macro_rules! cant_read {
                    () => {{
                        self.sink
                            .error(Some(&wh), format_args!(": can't read attribute value.\n"));
                        return Err(Bail);
                    }};
                }

                match form {
                    DW_FORM_strp => {
                        let Ok(mut addr) = ctx.dwarf_offset(self.dwarf_64) else {
                            cant_read!()
                        };

                        if let Some(rel) = self.reloc_next(ctx_offset, &wh) {
                            let r = self.reloc.as_deref_mut().expect("matched above");
                            relocate_one(
                                self.file,
                                r,
                                &rel,
                                if self.dwarf_64 { 8 } else { 4 },
                                &mut addr,
                                &wh,
                                RelTarget::Sec(SecId::Str),
                                self.sink,
                            );
                        } else if type_is_rel {
                            self.sink.message(
                                Cat::IMPACT_2 | Cat::DIE_OTHER | Cat::RELOC | Cat::STRINGS,
                                Some(&wh),
                                format_args!(": DW_FORM_strp seems to lack a relocation.\n"),
                            );
                        }

                        match self.strings {
                            None => self.sink.error(
                                Some(&wh),
                                format_args!(": strp attribute, but no .debug_str section.\n"),
                            ),
                            Some(strings) if addr >= strings.len() as u64 => self.sink.error(
                                Some(&wh),
                                format_args!(
                                    ": Invalid offset outside .debug_str: {addr:#x}.\n"
                                ),
                            ),
                            Some(strings) => {
                                // Record the used part of .debug_str.
                                if let Some(cov) = self.strings_coverage.as_deref_mut() {
                                    let len = strings[addr as usize..]
                                        .iter()
                                        .position(|&b| b == 0)
                                        .unwrap_or(strings.len() - addr as usize);
                                    cov.add(addr, len as u64 + 1);
                                }
                            }
                        }
                    }

                    DW_FORM_string => {
                        if ctx.str().is_err() {
                            cant_read!()
                        }
                    }

                    DW_FORM_addr | DW_FORM_ref_addr => {
                        let Ok(mut addr) = ctx.var(if self.addr_64 { 8 } else { 4 }) else {
                            cant_read!()
                        };

                        let is_low = it.name == DW_AT_low_pc;
                        let is_high = it.name == DW_AT_high_pc;

                        if let Some(rel) = self.reloc_next(ctx_offset, &wh) {
                            let r = self.reloc.as_deref_mut().expect("matched above");
                            let symbol = relocate_one(
                                self.file,
                                r,
                                &rel,
                                if self.addr_64 { 8 } else { 4 },
                                &mut addr,
                                &wh,
                                reloc_target(form, it.name),
                                self.sink,
                            );
                            if is_low {
                                low_pc_relocated = true;
                                low_pc_symbol = symbol;
                            } else if is_high {
                                high_pc_relocated = true;
                                high_pc_symbol = symbol;
                            }
                        } else if type_is_rel && addr != 0 {
                            // In non-rel files neither addr nor
                            // ref_addr needs a relocation; ref_addr is
                            // at least checked via the reference
                            // recorded below.
                            self.sink.message(
                                Cat::IMPACT_2 | Cat::DIE_REL | Cat::RELOC,
                                Some(&wh),
                                format_args!(": {form} seems to lack a relocation.\n"),
                            );
                        }

                        if is_low {
                            low_pc = Some(addr);
                        } else if is_high {
                            high_pc = Some(addr);
                        }

                        if it.name == DW_AT_sibling {
                            // A ref_addr sibling names a section
                            // offset; rebase it so the next-DIE check
                            // compares CU-relative offsets.
                            sibling_addr = Some(addr.wrapping_sub(self.cu.offset));
                        }

                        if form == DW_FORM_ref_addr {
                            self.record_ref(addr, &wh, false);
                        }

                        if abbrev.tag == DW_TAG_compile_unit || abbrev.tag == DW_TAG_partial_unit
                        {
                            if is_low {
                                self.cu.low_pc = Some(addr);
                            }
                            if let (Some(lo), Some(hi)) = (low_pc, high_pc) {
                                if hi >= lo {
                                    self.cu_cov.cov.add(lo, hi - lo);
                                }
                            }
                        }
                    }

                    DW_FORM_udata | DW_FORM_ref_udata => {
                        let Some(value) =
                            diag::checked_uleb128(ctx, self.sink, &wh, "attribute value")
                        else {
                            return Err(Bail);
                        };
                        if it.name == DW_AT_sibling {
                            sibling_addr = Some(value);
                        } else if form == DW_FORM_ref_udata {
                            self.record_ref(value, &wh, true);
                        }
                    }

                    DW_FORM_flag | DW_FORM_data1 | DW_FORM_ref1 => {
                        // Neither of these is subject to relocation.
                        let Ok(value) = ctx.u8() else { cant_read!() };
                        if it.name == DW_AT_sibling {
                            sibling_addr = Some(value.into());
                        } else if form == DW_FORM_ref1 {
                            self.record_ref(value.into(), &wh, true);
                        }
                    }

                    DW_FORM_data2 | DW_FORM_ref2 => {
                        let Ok(value) = ctx.u16() else { cant_read!() };
                        if it.name == DW_AT_sibling {
                            sibling_addr = Some(value.into());
                        } else if form == DW_FORM_ref2 {
                            self.record_ref(value.into(), &wh, true);
                        }
                    }

                    DW_FORM_data4 | DW_FORM_ref4 | DW_FORM_data8 | DW_FORM_ref8 => {
                        let width = if form == DW_FORM_data4 || form == DW_FORM_ref4 {
                            4
                        } else {
                            8
                        };
                        let Ok(mut value) = ctx.var(width) else { cant_read!() };

                        // The refN forms are not subject to relocation.
                        if form == DW_FORM_data4 || form == DW_FORM_data8 {
                            if let Some(rel) = self.reloc_next(ctx_offset, &wh) {
                                let r = self.reloc.as_deref_mut().expect("matched above");
                                relocate_one(
                                    self.file,
                                    r,
                                    &rel,
                                    width,
                                    &mut value,
                                    &wh,
                                    reloc_target(form, it.name),
                                    self.sink,
                                );
                            } else if type_is_rel && ptr != PtrCheck::Nothing {
                                self.sink.message(
                                    Cat::IMPACT_2 | Cat::DIE_OTHER | Cat::RELOC | ptr.cat(),
                                    Some(&wh),
                                    format_args!(": {form} seems to lack a relocation.\n"),
                                );
                            }
                        }

                        if it.name == DW_AT_sibling {
                            sibling_addr = Some(value);
                        } else if ptr != PtrCheck::Nothing {
                            self.check_ptr(ptr, value, &wh);
                        } else if form == DW_FORM_ref4 || form == DW_FORM_ref8 {
                            self.record_ref(value, &wh, true);
                        }
                    }

                    DW_FORM_sdata => {
                        if diag::checked_sleb128(ctx, self.sink, &wh, "attribute value")
                            .is_none()
                        {
                            return Err(Bail);
                        }
                    }

                    DW_FORM_block | DW_FORM_block1 | DW_FORM_block2 | DW_FORM_block4 => {
                        let length = match form {
                            DW_FORM_block => {
                                match diag::checked_uleb128(
                                    ctx,
                                    self.sink,
                                    &wh,
                                    "attribute value",
                                ) {
                                    Some(l) => l,
                                    None => return Err(Bail),
                                }
                            }
                            DW_FORM_block1 => match ctx.u8() {
                                Ok(l) => l.into(),
                                Err(_) => cant_read!(),
                            },
                            DW_FORM_block2 => match ctx.u16() {
                                Ok(l) => l.into(),
                                Err(_) => cant_read!(),
                            },
                            _ => match ctx.u32() {
                                Ok(l) => l.into(),
                                Err(_) => cant_read!(),
                            },
                        };

                        if abbrev::is_location_attrib(it.name) {
                            let expr_start = self.cu.offset + ctx.offset();
                            if locexpr::check_location_expression(
                                self.file,
                                ctx,
                                expr_start,
                                self.reloc.as_deref_mut(),
                                length,
                                &wh,
                                self.addr_64,
                                self.sink,
                            )
                            .is_err()
                            {
                                return Err(Bail);
                            }
                        } else if let Some(r) = self.reloc.as_deref_mut() {
                            r.skip_to(
                                self.cu.offset + ctx.offset() + length,
                                &wh,
                                Skip::Mismatched,
                                self.sink,
                            );
                        }

                        if ctx.skip(length).is_err() {
                            cant_read!()
                        }
                    }

                    DW_FORM_indirect => {
                        self.sink.error(
                            Some(&wh),
                            format_args!(": indirect form is again indirect.\n"),
                        );
                        return Err(Bail);
                    }

                    _ => {
                        self.sink.error(
                            Some(&wh),
                            format_args!(": internal error: unhandled form {form}.\n"),
                        );
                    }
                }
            }
            wh.reference = None;

            if let (Some(_), Some(_)) = (low_pc, high_pc) {
                if high_pc_relocated != low_pc_relocated {
                    self.sink.message(
                        Cat::DIE_OTHER | Cat::IMPACT_2 | Cat::RELOC,
                        Some(&wh),
                        format_args!(
                            ": only one of DW_AT_low_pc and DW_AT_high_pc is relocated.\n"
                        ),
                    );
                } else {
                    check_range_relocations(
                        Cat::DIE_OTHER,
                        &wh,
                        self.file,
                        low_pc_symbol,
                        high_pc_symbol,
                        "DW_AT_low_pc and DW_AT_high_pc",
                        self.sink,
                    );
                }
            }

            if abbrev.has_children {
                let mut child_wh = wh.clone();
                child_wh.reference = Some(Box::new(abbrev.wh.clone()));
                match self.walk_chain(ctx)? {
                    Walk::Loaded => {}
                    Walk::Empty => self.sink.message(
                        Cat::IMPACT_3 | Cat::SUBOPTIMAL | Cat::DIE_REL,
                        Some(&child_wh),
                        format_args!(": abbrev has_children, but the chain was empty.\n"),
                    ),
                }
            }
        }

        if let Some(sib) = sibling_addr {
            self.sink.error(
                Some(&wh),
                format_args!(
                    ": this DIE should have had its sibling at {sib:#x}, \
                     but the DIE chain ended.\n"
                ),
            );
        }

        Ok(if got_die { Walk::Loaded } else { Walk::Empty })
    }
}

/// Parse and validate one CU after its initial length field.
#[allow(clippy::too_many_arguments)]
fn check_cu_structural(
    file: &ElfData<'_>,
    ctx: &mut ReadCtx<'_>,
    cu: &mut Cu,
    abbrev_chain: &AbbrevChain,
    strings: Option<&[u8]>,
    dwarf_64: bool,
    strings_coverage: Option<&mut Coverage>,
    mut reloc: Option<&mut RelocData>,
    cu_cov: &mut CuCoverage,
    sink: &mut Sink,
) -> bool {
    let Ok(version) = ctx.u16() else {
        sink.error(Some(&cu.wh), format_args!(": can't read version.\n"));
        return false;
    };
    if !diag::supported_version(version, &[2, 3], &cu.wh, sink) {
        return false;
    }
    if version == 2 && dwarf_64 {
        // A standard violation, but the unit remains readable, so
        // keep going.
        sink.error(
            Some(&cu.wh),
            format_args!(": invalid 64-bit unit in DWARF 2 format.\n"),
        );
    }

    let ctx_offset = ctx.offset() + cu.offset;
    let Ok(mut abbrev_offset) = ctx.dwarf_offset(dwarf_64) else {
        sink.error(Some(&cu.wh), format_args!(": can't read abbrev offset.\n"));
        return false;
    };

    let rel = match reloc.as_deref_mut() {
        Some(r) => r.next(ctx_offset, &cu.wh, Skip::Mismatched, sink),
        None => None,
    };
    match (rel, reloc.as_deref_mut()) {
        (Some(rel), Some(r)) => {
            relocate_one(
                file,
                r,
                &rel,
                if dwarf_64 { 8 } else { 4 },
                &mut abbrev_offset,
                &cu.wh,
                RelTarget::Sec(SecId::Abbrev),
                sink,
            );
        }
        _ => {
            if file.is_rel {
                sink.message(
                    Cat::IMPACT_2 | Cat::INFO | Cat::RELOC,
                    Some(&cu.wh),
                    format_args!(": abbrev offset seems to lack a relocation.\n"),
                );
            }
        }
    }

    let Ok(address_size) = ctx.u8() else {
        sink.error(Some(&cu.wh), format_args!(": can't read address size.\n"));
        return false;
    };
    if address_size != 4 && address_size != 8 {
        sink.error(
            Some(&cu.wh),
            format_args!(": invalid address size: {address_size} (only 4 or 8 allowed).\n"),
        );
        return false;
    }
    cu.address_size = address_size as usize;

    let Some(abbrevs) = abbrev_chain.find_table(abbrev_offset) else {
        sink.error(
            Some(&cu.wh),
            format_args!(": couldn't find abbrev section with offset {abbrev_offset:#x}.\n"),
        );
        return false;
    };

    cu.cudie_offset = ctx.offset() + cu.offset;
    let cu_len = (ctx.end() - ctx.pos()) as u64 + ctx.offset();

    let mut local_die_refs = RefRecord::default();
    let mut walker = DieWalker {
        file,
        cu_len,
        cu: &mut *cu,
        abbrevs,
        strings,
        dwarf_64,
        addr_64: address_size == 8,
        local_die_refs: &mut local_die_refs,
        strings_coverage,
        reloc: reloc.filter(|r| !r.is_empty()),
        cu_cov: &mut *cu_cov,
        sink: &mut *sink,
    };

    match walker.walk_chain(ctx) {
        Ok(_) => {
            for a in &abbrevs.abbrevs {
                if !a.used.get() {
                    sink.message(
                        Cat::IMPACT_3 | Cat::BLOAT | Cat::ABBREVS,
                        Some(&cu.wh),
                        format_args!(": abbreviation with code {} is never used.\n", a.code),
                    );
                }
            }

            check_die_references(cu, &local_die_refs, sink)
        }
        Err(Bail) => false,
    }
}

/// Every CU-local reference must land on a recorded DIE start.
fn check_die_references(cu: &Cu, die_refs: &RefRecord, sink: &mut Sink) -> bool {
    let mut ok = true;
    for r in die_refs {
        if !cu.die_addrs.contains(r.addr) {
            sink.error(
                Some(&r.who),
                format_args!(": unresolved reference to DIE {:#x}.\n", r.addr),
            );
            ok = false;
        }
    }
    ok
}

/// Every global reference must land in some CU; a global reference
/// that resolves locally could have been encoded smaller.
fn check_global_die_references(cus: &[Cu], sink: &mut Sink) -> bool {
    let mut ok = true;
    for cu in cus {
        for r in &cu.die_refs {
            let target = cus.iter().find(|c| c.die_addrs.contains(r.addr));
            match target {
                None => {
                    sink.error(
                        Some(&r.who),
                        format_args!(
                            ": unresolved (non-CU-local) reference to DIE {:#x}.\n",
                            r.addr
                        ),
                    );
                    ok = false;
                }
                Some(t) if std::ptr::eq(t, cu) => sink.message(
                    Cat::IMPACT_2 | Cat::SUBOPTIMAL | Cat::DIE_REL,
                    Some(&r.who),
                    format_args!(": local reference to DIE {:#x} formed as global.\n", r.addr),
                ),
                Some(_) => {}
            }
        }
    }
    ok
}

/// Walk `.debug_info` CU by CU.
///
/// Returns the frozen CU list for the tabular checkers, or `None`
/// when the section (or its reference graph) is too broken for them
/// to make sense.
pub fn check_info_structural(
    file: &ElfData<'_>,
    sec: &mut DebugSec<'_>,
    abbrev_chain: &AbbrevChain,
    strings: Option<&[u8]>,
    cu_cov: &mut CuCoverage,
    sink: &mut Sink,
) -> Option<Vec<Cu>> {
    let DebugSec { data, rel, .. } = sec;
    let data: &[u8] = &**data;
    let mut ctx = ReadCtx::new(data, file.endian);

    let mut cus: Vec<Cu> = Vec::new();
    let mut success = true;

    let mut strings_coverage =
        (strings.is_some() && sink.accepts(Cat::STRINGS)).then(Coverage::new);

    let use_reloc = !rel.is_empty();

    while !ctx.eof() {
        let cu_begin = ctx.pos();
        let mut wh = Where::new(SecId::Info);
        wh.reset_1(cu_begin as u64);

        if !ctx.need_data(4) && diag::check_zero_padding(&mut ctx, Cat::INFO | Cat::HEADER, &wh, sink)
        {
            break;
        }

        let Ok(size32) = ctx.u32() else {
            sink.error(Some(&wh), format_args!(": can't read CU length.\n"));
            success = false;
            break;
        };
        if size32 == 0 && diag::check_zero_padding(&mut ctx, Cat::INFO | Cat::HEADER, &wh, sink) {
            break;
        }

        let Some((size, dwarf_64)) = diag::read_initial_length(&mut ctx, size32, sink, &wh)
        else {
            success = false;
            break;
        };

        if !ctx.need_data(size) {
            sink.error(
                Some(&wh),
                format_args!(
                    ": section doesn't have enough data to read CU of size {size:#x}.\n"
                ),
            );
            success = false;
            break;
        }

        let cu_end = ctx.pos() + size as usize;

        let mut cu = Cu {
            offset: cu_begin as u64,
            cudie_offset: 0,
            length: (cu_end - cu_begin) as u64,
            address_size: 0,
            low_pc: None,
            die_addrs: AddrRecord::default(),
            die_refs: RefRecord::default(),
            loc_refs: RefRecord::default(),
            range_refs: RefRecord::default(),
            line_refs: RefRecord::default(),
            wh: wh.clone(),
            has_arange: false,
            has_pubnames: false,
            has_pubtypes: false,
        };

        // version + debug_abbrev_offset + address_size
        let cu_header_size = 2 + if dwarf_64 { 8 } else { 4 } + 1;
        if size < cu_header_size {
            sink.error(
                Some(&wh),
                format_args!(": claimed length of {size:#x} doesn't even cover CU header.\n"),
            );
            success = false;
            break;
        }

        // The CU context begins just before the length field so that
        // DIE offsets come out CU-relative.
        let Ok(mut cu_ctx) = ctx.sub(cu_begin, cu_end) else {
            sink.error(Some(&wh), format_args!(": not enough data for next CU.\n"));
            success = false;
            break;
        };
        cu_ctx.seek(ctx.pos()).expect("within CU bounds");

        if !check_cu_structural(
            file,
            &mut cu_ctx,
            &mut cu,
            abbrev_chain,
            strings,
            dwarf_64,
            strings_coverage.as_mut(),
            use_reloc.then_some(&mut *rel),
            cu_cov,
            sink,
        ) {
            success = false;
            break;
        }

        if !cu_ctx.eof() && !diag::check_zero_padding(&mut cu_ctx, Cat::INFO, &wh, sink) {
            sink.padding_n0(
                Cat::INFO,
                &wh,
                cu_begin as u64 + cu_ctx.offset(),
                cu_end as u64,
            );
        }

        cus.push(cu);
        ctx.seek(cu_end).expect("checked above");
    }

    if success {
        if !ctx.eof() {
            sink.message(
                Cat::DIE_OTHER | Cat::IMPACT_4,
                Some(&Where::new(SecId::Info)),
                format_args!(": CU lengths don't exactly match section contents.\n"),
            );
        } else {
            rel.skip_rest(SecId::Info, sink);
        }
    }

    // All CUs are expected to agree on the address size.
    let mut it = cus.iter();
    if let Some(first) = it.next() {
        for cu in it {
            if cu.address_size != first.address_size {
                sink.message(
                    Cat::INFO,
                    Some(&cu.wh),
                    format_args!(": has different address size than CU {:#x}.\n", first.offset),
                );
                break;
            }
        }
    }

    let references_sound = check_global_die_references(&cus, sink);

    if let (Some(cov), Some(strings)) = (strings_coverage, strings) {
        if success {
            let wh = Where::new(SecId::Str);
            cov.find_holes(0, strings.len() as u64, |start, len| {
                diag::report_hole(start, len, strings, 0, Cat::STRINGS, &wh, sink);
                true
            });
        }
    }

    if !success || !references_sound {
        return None;
    }

    Some(cus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abbrev;
    use crate::tests::{minimal_elf64, parse_minimal};
    use object::Endianness;

    /// Assemble a 32-bit DWARF3 CU around the given DIE bytes.
    fn cu(dies: &[u8]) -> Vec<u8> {
        let mut sec = vec![];
        let len = 2 + 4 + 1 + dies.len();
        sec.extend((len as u32).to_le_bytes());
        sec.extend(3u16.to_le_bytes()); // version
        sec.extend(0u32.to_le_bytes()); // abbrev offset
        sec.push(8); // address size
        sec.extend(dies);
        sec
    }

    fn run(abbrev_bytes: &[u8], info: &[u8]) -> (Option<Vec<Cu>>, u64, CuCoverage) {
        let image = minimal_elf64();
        let mut sink = Sink::default();
        let file = parse_minimal(&image, &mut sink);

        let mut actx = ReadCtx::new(abbrev_bytes, Endianness::Little);
        let chain = abbrev::load(&mut actx, &mut sink).unwrap();

        let mut sec = DebugSec {
            id: SecId::Info,
            shndx: 0,
            data: crate::elf::SectionData::Borrowed(info),
            rel: Default::default(),
        };
        let mut cu_cov = CuCoverage::default();
        let cus = check_info_structural(&file, &mut sec, &chain, None, &mut cu_cov, &mut sink);
        (cus, sink.count, cu_cov)
    }

    // Abbrevs: 1 = compile_unit (children, no attributes);
    //          2 = base_type (no children, no attributes);
    //          3 = lexical_block (children, sibling/ref4).
    const ABBREV: &[u8] = &[
        0x01, 0x11, 0x01, 0x00, 0x00, //
        0x02, 0x24, 0x00, 0x00, 0x00, //
        0x03, 0x0b, 0x01, 0x01, 0x13, 0x00, 0x00, //
        0x00,
    ];

    // Abbrev 1 alone: compile_unit with children, no attributes.
    const ABBREV_CU_ONLY: &[u8] = &[0x01, 0x11, 0x01, 0x00, 0x00, 0x00];

    #[test]
    fn well_formed_unit() {
        // CU DIE at 0xb; lexical block at 0xc advertising its sibling
        // at 0x13; block child (base_type) at 0x11; sibling base_type
        // at 0x13.
        let info = cu(&[
            0x01, // 0xb: CU DIE
            0x03, 0x13, 0x00, 0x00, 0x00, // 0xc: block, sibling -> 0x13
            0x02, // 0x11: child of the block
            0x00, // 0x12: end of block children
            0x02, // 0x13: sibling of the block
            0x00, // 0x14: end of CU DIE children
        ]);
        let (cus, count, _) = run(ABBREV, &info);
        let cus = cus.unwrap();
        assert_eq!(count, 0, "expected a clean parse");
        assert_eq!(cus.len(), 1);

        let cu = &cus[0];
        assert_eq!(cu.offset, 0);
        assert_eq!(cu.cudie_offset, 0xb);
        assert_eq!(cu.address_size, 8);
        assert_eq!(cu.die_addrs.len(), 4);
        for addr in [0xb, 0xc, 0x11, 0x13] {
            assert!(cu.die_addrs.contains(addr));
        }
    }

    #[test]
    fn sibling_offset_mismatch() {
        // The block advertises its sibling at 0x12; the DIE stream
        // puts it at 0x13.
        let info = cu(&[
            0x01, //
            0x03, 0x12, 0x00, 0x00, 0x00, //
            0x02, 0x00, //
            0x02, 0x00,
        ]);
        let (cus, count, _) = run(ABBREV, &info);
        assert!(cus.is_some());
        assert_eq!(count, 1);
    }

    #[test]
    fn sibling_with_ref_addr_form() {
        // Like ABBREV, but the block's sibling uses DW_FORM_ref_addr,
        // so its value is a section offset rather than CU-relative.
        const ABBREV_RA: &[u8] = &[
            0x01, 0x11, 0x01, 0x00, 0x00, //
            0x02, 0x24, 0x00, 0x00, 0x00, //
            0x03, 0x0b, 0x01, 0x01, 0x10, 0x00, 0x00, //
            0x00,
        ];

        let mut dies = vec![0x01, 0x03];
        dies.extend(0x17u64.to_le_bytes()); // sibling -> DIE at 0x17
        dies.extend([0x02, 0x00, 0x02, 0x00]);
        let (cus, count, _) = run(ABBREV_RA, &cu(&dies));
        assert!(cus.is_some());
        // The abbrev-level ref_addr notice, plus the reference
        // resolving within its own CU despite being formed as global.
        assert_eq!(count, 2);

        // Advertise the block's child instead: the next sibling DIE
        // sits at 0x17, so the offset check fires.
        let mut dies = vec![0x01, 0x03];
        dies.extend(0x15u64.to_le_bytes());
        dies.extend([0x02, 0x00, 0x02, 0x00]);
        let (cus, count, _) = run(ABBREV_RA, &cu(&dies));
        assert!(cus.is_some());
        assert_eq!(count, 3);
    }

    #[test]
    fn sibling_on_last_die_in_chain() {
        // The block advertises a sibling but is the last DIE of its
        // chain.
        let info = cu(&[
            0x01, //
            0x03, 0x13, 0x00, 0x00, 0x00, //
            0x02, 0x00, // block child, end of block children
            0x00, // end of CU children: block has no sibling
        ]);
        let (_, count, _) = run(ABBREV, &info);
        // The dangling sibling error, plus the unused base_type-only
        // path: abbrev 2 is used, so just the one error... and the
        // base_type child leaves nothing else to flag.
        assert_eq!(count, 1);
    }

    #[test]
    fn empty_child_chain_is_suboptimal() {
        let info = cu(&[
            0x01, // CU DIE with children
            0x00, // ...but the chain is empty
        ]);
        let (_, count, _) = run(ABBREV_CU_ONLY, &info);
        assert_eq!(count, 1);
    }

    #[test]
    fn unknown_abbrev_code_bails() {
        let info = cu(&[0x7f, 0x00]);
        let (cus, count, _) = run(ABBREV_CU_ONLY, &info);
        assert!(cus.is_none());
        assert_eq!(count, 1);
    }

    #[test]
    fn bad_address_size_bails() {
        let mut sec = vec![];
        sec.extend(8u32.to_le_bytes());
        sec.extend(3u16.to_le_bytes());
        sec.extend(0u32.to_le_bytes());
        sec.push(5); // address size 5
        sec.push(0);
        let (cus, count, _) = run(ABBREV, &sec);
        assert!(cus.is_none());
        assert!(count > 0);
    }

    // Abbrev 1 alone: base_type, no children, no attributes.
    const ABBREV_BT: &[u8] = &[0x01, 0x24, 0x00, 0x00, 0x00, 0x00];

    #[test]
    fn trailing_zero_padding_is_reported() {
        let mut info = cu(&[0x01, 0x00]);
        info.extend([0u8; 8]); // inter-CU padding
        let (cus, count, _) = run(ABBREV_BT, &info);
        assert!(cus.is_some());
        assert_eq!(count, 1);
    }

    #[test]
    fn dwarf2_with_64bit_length() {
        let dies = [0x01u8, 0x00];
        let len = (2 + 8 + 1 + dies.len()) as u64;
        let mut sec = vec![];
        sec.extend(0xffff_ffffu32.to_le_bytes());
        sec.extend(len.to_le_bytes());
        sec.extend(2u16.to_le_bytes()); // DWARF 2
        sec.extend(0u64.to_le_bytes()); // abbrev offset, 8 bytes
        sec.push(8);
        sec.extend(dies);

        let (cus, count, _) = run(ABBREV_BT, &sec);
        assert!(cus.is_some(), "the unit stays readable");
        assert_eq!(count, 1, "standards violation reported");
    }

    #[test]
    fn length_escape_range_is_error() {
        let mut sec = vec![];
        sec.extend(0xffff_fff0u32.to_le_bytes());
        let (cus, count, _) = run(ABBREV, &sec);
        assert!(cus.is_none());
        assert_eq!(count, 1);
    }

    #[test]
    fn unresolved_local_reference() {
        // Abbrev 1: compile_unit with DW_AT_type/ref4, no children.
        let abbrev: &[u8] = &[0x01, 0x11, 0x00, 0x49, 0x13, 0x00, 0x00, 0x00];
        let info = cu(&[
            0x01, 0x10, 0x00, 0x00, 0x00, // type ref -> 0x10, mid-DIE
            0x00,
        ]);
        let (cus, count, _) = run(abbrev, &info);
        assert!(cus.is_none(), "broken references invalidate the chain");
        assert_eq!(count, 1);
    }

    #[test]
    fn cu_coverage_from_pc_pair() {
        // compile_unit with low_pc then high_pc, DW_FORM_addr.
        let abbrev: &[u8] = &[
            0x01, 0x11, 0x00, 0x11, 0x01, 0x12, 0x01, 0x00, 0x00, 0x00,
        ];
        let mut dies = vec![0x01];
        dies.extend(0x400000u64.to_le_bytes());
        dies.extend(0x400080u64.to_le_bytes());
        dies.push(0x00);
        let info = cu(&dies);

        let (cus, count, cov) = run(abbrev, &info);
        assert_eq!(count, 0);
        assert_eq!(cus.unwrap()[0].low_pc, Some(0x400000));
        assert!(cov.cov.is_covered(0x400000, 0x80));
        assert!(!cov.cov.is_overlap(0x400080, 1));
        assert!(!cov.need_ranges);
    }

    #[test]
    fn strp_without_relocation_in_et_rel() {
        // compile_unit with DW_AT_name/strp. In an ET_REL file the
        // strp offset must carry a relocation; here it doesn't.
        let abbrev: &[u8] = &[0x01, 0x11, 0x00, 0x03, 0x0e, 0x00, 0x00, 0x00];
        let info = cu(&[0x01, 0x00, 0x00, 0x00, 0x00, 0x00]);
        let strings = b"a.c\x00";

        let image = crate::tests::minimal_elf64_rel();
        let mut sink = Sink::default();
        let file = parse_minimal(&image, &mut sink);

        let mut actx = ReadCtx::new(abbrev, Endianness::Little);
        let chain = abbrev::load(&mut actx, &mut sink).unwrap();

        let mut sec = DebugSec {
            id: SecId::Info,
            shndx: 0,
            data: crate::elf::SectionData::Borrowed(&info),
            rel: Default::default(),
        };
        let mut cu_cov = CuCoverage::default();
        let cus = check_info_structural(
            &file,
            &mut sec,
            &chain,
            Some(strings),
            &mut cu_cov,
            &mut sink,
        );

        assert!(cus.is_some());
        // The lacking relocation for the strp, and one for the CU
        // header's abbrev offset.
        assert_eq!(sink.count, 2);
        assert_eq!(sink.error_count, 0, "lack-of-relocation is a warning");
    }

    #[test]
    fn rangeptr_records_reference() {
        // compile_unit with DW_AT_ranges/data4.
        let abbrev: &[u8] = &[0x01, 0x11, 0x00, 0x55, 0x06, 0x00, 0x00, 0x00];
        let info = cu(&[0x01, 0x10, 0x00, 0x00, 0x00, 0x00]);
        let (cus, count, cov) = run(abbrev, &info);
        // 0x10 is not aligned to the 8-byte CU address size? It is.
        assert_eq!(count, 0);
        let cus = cus.unwrap();
        assert_eq!(cus[0].range_refs.len(), 1);
        assert!(cov.need_ranges);
    }
}
