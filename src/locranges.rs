// Copyright The dwarflint Authors
// SPDX-License-Identifier: Apache-2.0

//! Structural validation of `.debug_loc` and `.debug_ranges`.
//!
//! Both sections hold lists of address pairs with the same framing:
//! an all-ones first address selects a new base, a zero pair ends the
//! list, and `.debug_loc` entries additionally carry a location
//! expression. The checker walks every list referenced from the CU
//! chain, validating base-address discipline and relocation pairing,
//! and accounting for every referenced byte so that overlaps between
//! lists and unreferenced gaps can be reported.

use crate::coverage::Coverage;
use crate::covmap::CoverageMap;
use crate::diag::{self, Cat, SecId, Sink, Where};
use crate::elf::{DebugSec, ElfData, RelSymbol, SHF_ALLOC, SHF_EXECINSTR};
use crate::info::{Cu, CuCoverage};
use crate::locexpr;
use crate::readctx::ReadCtx;
use crate::reloc::{check_range_relocations, relocate_one, RelTarget, RelocData, Skip};

/// One list reference to process: target offset, referring CU, and
/// the referrer's breadcrumb.
struct LocRangeRef<'a> {
    addr: u64,
    cu: &'a Cu,
    who: Where,
}

/// Walk one location or range list starting at `addr`.
#[allow(clippy::too_many_arguments)]
fn check_loc_or_range_ref(
    file: &ElfData<'_>,
    data: &[u8],
    cu: &Cu,
    sec_id: SecId,
    rel: &mut RelocData,
    coverage: &mut Coverage,
    mut coverage_map: Option<&mut CoverageMap>,
    mut cu_cov: Option<&mut CuCoverage>,
    addr: u64,
    wh: &Where,
    cat: Cat,
    sink: &mut Sink,
) -> bool {
    let addr_64 = cu.address_size == 8;
    let width = cu.address_size as u64;

    let mut ctx = ReadCtx::new(data, file.endian);
    if ctx.skip(addr).is_err() {
        sink.error(
            Some(wh),
            format_args!(
                ": invalid reference outside the section {addr:#x}, size only {:#x}.\n",
                data.len()
            ),
        );
        return false;
    }

    let mut retval = true;
    let contains_locations = sec_id == SecId::Loc;

    if coverage.is_covered(addr, 1) {
        sink.error(
            Some(wh),
            format_args!(": reference to {addr:#x} points into another location or range list.\n"),
        );
        retval = false;
    }

    let escape = if addr_64 {
        u64::MAX
    } else {
        u32::MAX as u64
    };

    let mut overlap = false;
    let mut base = cu.low_pc;

    while !ctx.eof() {
        let mut ewh = Where::new_ref(sec_id, wh);
        let entry_off = ctx.offset();
        ewh.reset_1(entry_off);

        let mut have_overlap = |sink: &mut Sink, retval: &mut bool, overlap: &mut bool| {
            sink.error(Some(&ewh), format_args!(": range definitions overlap.\n"));
            *retval = false;
            *overlap = true;
        };

        // Begin address.
        let begin_off = ctx.offset();
        if !overlap && coverage.is_overlap(begin_off, width) {
            have_overlap(sink, &mut retval, &mut overlap);
        }

        let Ok(mut begin_addr) = ctx.var(cu.address_size) else {
            sink.error(Some(&ewh), format_args!(": can't read address range beginning.\n"));
            return false;
        };

        let mut begin_relocated = false;
        let mut begin_symbol: Option<RelSymbol> = None;
        if let Some(r) = rel.next(begin_off, &ewh, Skip::Mismatched, sink) {
            begin_relocated = true;
            begin_symbol = relocate_one(
                file,
                rel,
                &r,
                cu.address_size,
                &mut begin_addr,
                &ewh,
                RelTarget::Value,
                sink,
            );
        }

        // End address.
        let end_off = ctx.offset();
        if !overlap && coverage.is_overlap(end_off, width) {
            have_overlap(sink, &mut retval, &mut overlap);
        }

        let Ok(mut end_addr) = ctx.var(cu.address_size) else {
            sink.error(Some(&ewh), format_args!(": can't read address range ending.\n"));
            return false;
        };

        let mut end_relocated = false;
        if let Some(r) = rel.next(end_off, &ewh, Skip::Mismatched, sink) {
            end_relocated = true;
            let end_symbol = relocate_one(
                file,
                rel,
                &r,
                cu.address_size,
                &mut end_addr,
                &ewh,
                RelTarget::Value,
                sink,
            );
            if begin_addr != escape {
                if !begin_relocated {
                    sink.message(
                        cat | Cat::IMPACT_2 | Cat::RELOC,
                        Some(&ewh),
                        format_args!(
                            ": end of address range is relocated, but the beginning wasn't.\n"
                        ),
                    );
                } else {
                    check_range_relocations(
                        cat,
                        &ewh,
                        file,
                        begin_symbol,
                        end_symbol,
                        "begin and end address",
                        sink,
                    );
                }
            }
        } else if begin_relocated {
            sink.message(
                cat | Cat::IMPACT_2 | Cat::RELOC,
                Some(&ewh),
                format_args!(": end of address range is not relocated, but the beginning was.\n"),
            );
        }

        let mut done = false;
        if begin_addr == 0 && end_addr == 0 && !begin_relocated && !end_relocated {
            done = true;
        } else if begin_addr != escape {
            if base.is_none() {
                sink.error(
                    Some(&ewh),
                    format_args!(
                        ": address range with no base address set: [{begin_addr:#x}, {end_addr:#x}).\n"
                    ),
                );
                // Not something that would derail the higher-level
                // checks, so carry on.
            }

            if end_addr < begin_addr {
                sink.message(
                    cat | Cat::ERROR,
                    Some(&ewh),
                    format_args!(": has negative range [{begin_addr:#x}, {end_addr:#x}).\n"),
                );
            } else if begin_addr == end_addr {
                // An entry whose beginning and ending addresses are
                // equal has no effect.
                sink.message(
                    cat | Cat::BLOAT | Cat::IMPACT_3,
                    Some(&ewh),
                    format_args!(": entry covers no range.\n"),
                );
            } else if retval {
                if let Some(b) = base {
                    let address = begin_addr.wrapping_add(b);
                    let length = end_addr - begin_addr;
                    if let Some(map) = coverage_map.as_deref_mut() {
                        map.add(&file.sections, address, length, &ewh, cat, sink);
                    }
                    if let Some(cc) = cu_cov.as_deref_mut() {
                        cc.cov.add(address, length);
                    }
                }
            }

            if contains_locations {
                // Location expression length.
                if !overlap && coverage.is_overlap(ctx.offset(), 2) {
                    have_overlap(sink, &mut retval, &mut overlap);
                }

                let Ok(len) = ctx.u16() else {
                    sink.error(
                        Some(&ewh),
                        format_args!(": can't read length of location expression.\n"),
                    );
                    return false;
                };

                // The expression itself.
                let expr_start = ctx.offset();
                if locexpr::check_location_expression(
                    file,
                    &ctx,
                    expr_start,
                    Some(&mut *rel),
                    len.into(),
                    &ewh,
                    addr_64,
                    sink,
                )
                .is_err()
                {
                    return false;
                }
                if !overlap && coverage.is_overlap(expr_start, len.into()) {
                    have_overlap(sink, &mut retval, &mut overlap);
                }

                if ctx.skip(len.into()).is_err() {
                    sink.error(
                        Some(&ewh),
                        format_args!(": not enough data for location expression.\n"),
                    );
                    return false;
                }
            }
        } else {
            // Base address selection.
            if Some(end_addr) == base {
                sink.message(
                    cat | Cat::BLOAT | Cat::IMPACT_3,
                    Some(&ewh),
                    format_args!(
                        ": base address selection doesn't change base address ({end_addr:#x}).\n"
                    ),
                );
            } else {
                base = Some(end_addr);
            }
        }

        coverage.add(entry_off, ctx.offset() - entry_off);
        if done {
            break;
        }
    }

    retval
}

/// Check `.debug_loc` or `.debug_ranges` against the references the
/// DIE walker collected.
///
/// `cu_cov` is passed for `.debug_ranges` so that range data can be
/// fused into the CU coverage; on success its `need_ranges` flag is
/// cleared. `range_coverage` additionally compares every range
/// against the allocated ELF sections.
pub fn check_loc_or_range_structural(
    file: &ElfData<'_>,
    sec: &mut DebugSec<'_>,
    cus: &[Cu],
    mut cu_cov: Option<&mut CuCoverage>,
    range_coverage: bool,
    sink: &mut Sink,
) -> bool {
    debug_assert!(matches!(sec.id, SecId::Loc | SecId::Ranges));

    let sec_id = sec.id;
    let cat = if sec_id == SecId::Loc {
        Cat::LOC
    } else {
        Cat::RANGES
    };

    let DebugSec { data, rel, .. } = sec;
    let data: &[u8] = &**data;

    let mut retval = true;

    let mut coverage_map = (range_coverage && sec_id == SecId::Ranges).then(|| {
        CoverageMap::new(
            &file.sections,
            SHF_EXECINSTR | SHF_ALLOC,
            SHF_ALLOC,
            sec_id == SecId::Loc,
        )
    });

    // Overlap discovery.
    let mut coverage = Coverage::new();

    // The relocation matcher needs monotonically increasing offsets,
    // which the DIE walk's reference order does not guarantee. Merge
    // all references into one array sorted by target offset.
    let mut refs: Vec<LocRangeRef<'_>> = Vec::new();
    for cu in cus {
        let rec = if sec_id == SecId::Loc {
            &cu.loc_refs
        } else {
            &cu.range_refs
        };
        for r in rec {
            refs.push(LocRangeRef {
                addr: r.addr,
                cu,
                who: r.who.clone(),
            });
        }
    }
    refs.sort_by_key(|r| r.addr);

    let mut last_off = None;
    for r in &refs {
        if last_off == Some(r.addr) {
            continue;
        }
        if last_off.is_some() {
            rel.skip_to(r.addr, &Where::new(sec_id), Skip::Unref, sink);
        }

        if !check_loc_or_range_ref(
            file,
            data,
            r.cu,
            sec_id,
            rel,
            &mut coverage,
            coverage_map.as_mut(),
            cu_cov.as_deref_mut(),
            r.addr,
            &r.who,
            cat,
            sink,
        ) {
            retval = false;
        }
        last_off = Some(r.addr);
    }

    if retval {
        rel.skip_rest(sec_id, sink);

        // All CUs agree on the address size (checked while building
        // the chain), so the first one's is as good as any.
        let align = cus.first().map(|cu| cu.address_size as u64).unwrap_or(0);
        let wh = Where::new(sec_id);
        coverage.find_holes(0, data.len() as u64, |start, len| {
            diag::report_hole(start, len, data, align, cat, &wh, sink);
            true
        });

        if let Some(map) = &coverage_map {
            map.find_holes(
                &file.sections,
                file.is_rel,
                |ndx| file.section_data(ndx),
                cat,
                &wh,
                sink,
            );
        }
    }

    if retval {
        if let Some(cc) = cu_cov {
            // Only drop the flag on success, so that later coverage
            // analysis isn't done against incomplete data.
            cc.need_ranges = false;
        }
    }

    retval
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::SecId;
    use crate::records::RefRecord;
    use crate::tests::{minimal_elf64, parse_minimal};

    fn cu_with_refs(offsets: &[u64], low_pc: Option<u64>, ranges: bool) -> Cu {
        let mut wh = Where::new(SecId::Info);
        wh.reset_1(0);
        let mut cu = Cu {
            offset: 0,
            cudie_offset: 0xb,
            length: 0x20,
            address_size: 8,
            low_pc,
            die_addrs: Default::default(),
            die_refs: RefRecord::default(),
            loc_refs: RefRecord::default(),
            range_refs: RefRecord::default(),
            line_refs: RefRecord::default(),
            wh: wh.clone(),
            has_arange: false,
            has_pubnames: false,
            has_pubtypes: false,
        };
        for &off in offsets {
            if ranges {
                cu.range_refs.add(off, &wh);
            } else {
                cu.loc_refs.add(off, &wh);
            }
        }
        cu
    }

    fn run_ranges(section: &[u8], cu: Cu) -> (bool, u64, CuCoverage) {
        let image = minimal_elf64();
        let mut sink = Sink::default();
        let file = parse_minimal(&image, &mut sink);
        let mut sec = DebugSec {
            id: SecId::Ranges,
            shndx: 0,
            data: crate::elf::SectionData::Borrowed(section),
            rel: Default::default(),
        };
        let mut cu_cov = CuCoverage {
            cov: Coverage::new(),
            need_ranges: true,
        };
        let cus = vec![cu];
        let ok = check_loc_or_range_structural(
            &file,
            &mut sec,
            &cus,
            Some(&mut cu_cov),
            false,
            &mut sink,
        );
        (ok, sink.count, cu_cov)
    }

    fn le64(vals: &[u64]) -> Vec<u8> {
        vals.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn plain_range_list() {
        let section = le64(&[0x10, 0x20, 0, 0]);
        let (ok, count, cov) = run_ranges(&section, cu_with_refs(&[0], Some(0x400000), true));
        assert!(ok);
        assert_eq!(count, 0);
        assert!(cov.cov.is_covered(0x400010, 0x10));
        assert!(!cov.need_ranges);
    }

    #[test]
    fn base_address_selection() {
        let section = le64(&[u64::MAX, 0x500000, 0x0, 0x8, 0, 0]);
        let (ok, count, cov) = run_ranges(&section, cu_with_refs(&[0], None, true));
        assert!(ok);
        assert_eq!(count, 0);
        assert!(cov.cov.is_covered(0x500000, 0x8));
    }

    #[test]
    fn missing_base_address() {
        let section = le64(&[0x10, 0x20, 0, 0]);
        let (ok, count, cov) = run_ranges(&section, cu_with_refs(&[0], None, true));
        // Reported, but processing continues.
        assert!(ok);
        assert_eq!(count, 1);
        assert!(cov.cov.is_empty());
    }

    #[test]
    fn negative_and_empty_ranges() {
        let section = le64(&[0x20, 0x10, 0x8, 0x8, 0, 0]);
        let (ok, count, _) = run_ranges(&section, cu_with_refs(&[0], Some(0x1000), true));
        assert!(ok);
        assert_eq!(count, 2); // negative range + empty range
    }

    #[test]
    fn redundant_base_selection() {
        let section = le64(&[u64::MAX, 0x1000, u64::MAX, 0x1000, 0, 0]);
        let (_, count, _) = run_ranges(&section, cu_with_refs(&[0], None, true));
        assert_eq!(count, 1);
    }

    #[test]
    fn overlapping_lists() {
        // Two references, the second pointing mid-list into the first.
        let section = le64(&[0x10, 0x20, 0, 0]);
        let (ok, count, _) =
            run_ranges(&section, cu_with_refs(&[0, 8], Some(0x400000), true));
        assert!(!ok);
        assert!(count >= 1);
    }

    #[test]
    fn unreferenced_tail_is_reported() {
        let mut section = le64(&[0x10, 0x20, 0, 0]);
        section.extend([0xaa; 8]); // trailing junk no list refers to
        let (ok, count, _) = run_ranges(&section, cu_with_refs(&[0], Some(0x400000), true));
        assert!(ok);
        assert_eq!(count, 1);
    }

    #[test]
    fn loc_list_with_expression() {
        // [0x10, 0x20) with a one-byte expression DW_OP_reg0, then
        // end of list.
        let mut section = le64(&[0x10, 0x20]);
        section.extend(1u16.to_le_bytes());
        section.push(0x50); // DW_OP_reg0
        section.extend(le64(&[0, 0]));

        let image = minimal_elf64();
        let mut sink = Sink::default();
        let file = parse_minimal(&image, &mut sink);
        let mut sec = DebugSec {
            id: SecId::Loc,
            shndx: 0,
            data: crate::elf::SectionData::Borrowed(&section),
            rel: Default::default(),
        };
        let cus = vec![cu_with_refs(&[0], Some(0x400000), false)];
        let ok = check_loc_or_range_structural(&file, &mut sec, &cus, None, false, &mut sink);
        assert!(ok);
        assert_eq!(sink.count, 0);
    }
}
