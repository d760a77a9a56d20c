// Copyright The dwarflint Authors
// SPDX-License-Identifier: Apache-2.0

//! Structural validation of `.debug_aranges`.
//!
//! The section is a sequence of tables, each tied to one CU: a header,
//! alignment padding up to a tuple boundary, then `(address, length)`
//! tuples ending at `(0, 0)`. Besides the per-table structure this
//! also accumulates an address coverage which is compared against the
//! coverage derived from the CU chain: addresses claimed by CUs ought
//! to be findable through aranges.

use crate::coverage::Coverage;
use crate::diag::{self, Cat, SecId, Sink, Where};
use crate::elf::{necessary_alignment, DebugSec, ElfData};
use crate::info::{find_cu_mut, Cu};
use crate::readctx::ReadCtx;
use crate::reloc::{relocate_one, RelTarget, Skip};

/// Report address ranges present in `coverage` but missing from
/// `other` (e.g. covered by CUs, but not by aranges).
fn compare_coverage(
    file: &ElfData<'_>,
    coverage: &Coverage,
    other: &Coverage,
    sec_id: SecId,
    what: &str,
    sink: &mut Sink,
) {
    let mut cov = coverage.clone();
    cov.remove_all(other);

    let wh = Where::new(sec_id);
    cov.find_ranges(|start, length| {
        // Check alignment against the section the hole lies in.
        let sec = file.sections.iter().skip(1).find(|s| {
            start >= s.addr && start + length < s.addr + s.size
        });

        let aligned = sec.is_some_and(|s| necessary_alignment(start, length, s.align));
        if !aligned {
            sink.message(
                Cat::ARANGES | Cat::IMPACT_3,
                Some(&wh),
                format_args!(
                    ": addresses [{start:#x}, {:#x}) are covered with CUs, but not with {what}.\n",
                    start + length
                ),
            );
        }

        if sec.is_none() {
            sink.error(
                None,
                format_args!("Couldn't find the section containing the above hole.\n"),
            );
        }

        true
    });
}

/// Walk `.debug_aranges` table by table.
///
/// `coverage` is the address space covered by CUs, either via
/// `low_pc`/`high_pc` pairs or via `.debug_ranges`; when present, the
/// aranges coverage is compared against it. `tolerant_overlap`
/// suppresses the overlap warning (GNU toolchains produce them).
pub fn check_aranges_structural(
    file: &ElfData<'_>,
    sec: &mut DebugSec<'_>,
    cus: &mut [Cu],
    coverage: Option<&Coverage>,
    tolerant_overlap: bool,
    sink: &mut Sink,
) -> bool {
    let DebugSec { data, rel, .. } = sec;
    let data: &[u8] = &**data;
    let mut ctx = ReadCtx::new(data, file.endian);

    let mut retval = true;
    let mut aranges_coverage = coverage.is_some().then(Coverage::new);

    while !ctx.eof() {
        let mut wh = Where::new(SecId::Aranges);
        wh.reset_1(ctx.offset());
        let table_begin = ctx.pos();

        let Ok(size32) = ctx.u32() else {
            sink.error(Some(&wh), format_args!(": can't read table length.\n"));
            return false;
        };
        let Some((size, dwarf_64)) = diag::read_initial_length(&mut ctx, size32, sink, &wh)
        else {
            return false;
        };

        let table_end = ctx.pos() + size as usize;
        let Ok(mut sub_ctx) = ctx.sub(table_begin, table_end) else {
            sink.error(Some(&wh), format_args!(": not enough data for next table.\n"));
            return false;
        };
        sub_ctx.seek(ctx.pos()).expect("within table bounds");

        'table: {
            let Ok(version) = sub_ctx.u16() else {
                sink.error(Some(&wh), format_args!(": can't read version.\n"));
                retval = false;
                break 'table;
            };
            if !diag::supported_version(version, &[2], &wh, sink) {
                retval = false;
                break 'table;
            }

            // CU offset.
            let ctx_offset = sub_ctx.pos() as u64;
            let Ok(mut cu_offset) = sub_ctx.dwarf_offset(dwarf_64) else {
                sink.error(Some(&wh), format_args!(": can't read debug info offset.\n"));
                retval = false;
                break 'table;
            };

            if let Some(r) = rel.next(ctx_offset, &wh, Skip::Mismatched, sink) {
                relocate_one(
                    file,
                    rel,
                    &r,
                    if dwarf_64 { 8 } else { 4 },
                    &mut cu_offset,
                    &wh,
                    RelTarget::Sec(SecId::Info),
                    sink,
                );
            } else if file.is_rel {
                sink.message(
                    Cat::IMPACT_2 | Cat::ARANGES | Cat::RELOC | Cat::HEADER,
                    Some(&wh),
                    format_args!(": debug info offset seems to lack a relocation.\n"),
                );
            }

            let cu = if cus.is_empty() {
                None
            } else {
                let found = find_cu_mut(cus, cu_offset);
                if found.is_none() {
                    sink.error(
                        Some(&wh),
                        format_args!(": unresolved reference to CU {cu_offset:#x}.\n"),
                    );
                }
                found
            };

            let cu_address_size = if let Some(cu) = &cu {
                wh.reference = Some(Box::new(Where::cu_die(cu.cudie_offset)));
                Some(cu.address_size)
            } else {
                None
            };
            if let Some(cu) = cu {
                if cu.has_arange {
                    sink.message(
                        Cat::IMPACT_2 | Cat::ARANGES | Cat::HEADER,
                        Some(&wh),
                        format_args!(": there has already been arange section for this CU.\n"),
                    );
                } else {
                    cu.has_arange = true;
                }
            }

            // Address size.
            let Ok(address_size) = sub_ctx.u8() else {
                sink.error(Some(&wh), format_args!(": can't read address size.\n"));
                retval = false;
                break 'table;
            };
            match cu_address_size {
                Some(cu_as) => {
                    if address_size as usize != cu_as {
                        sink.error(
                            Some(&wh),
                            format_args!(
                                ": address size {address_size} doesn't match referred CU.\n"
                            ),
                        );
                        retval = false;
                    }
                }
                // Parse on anyway, unless the address size is wacky.
                None if address_size != 4 && address_size != 8 => {
                    sink.error(
                        Some(&wh),
                        format_args!(": invalid address size: {address_size}.\n"),
                    );
                    retval = false;
                    break 'table;
                }
                None => {}
            }

            // Segment size.
            let Ok(segment_size) = sub_ctx.u8() else {
                sink.error(Some(&wh), format_args!(": can't read unit segment size.\n"));
                retval = false;
                break 'table;
            };
            if segment_size != 0 {
                sink.warning(
                    Some(&wh),
                    format_args!(": dwarflint can't handle segment_size != 0.\n"),
                );
                retval = false;
                break 'table;
            }

            // The first tuple begins at a multiple of twice the
            // address size past the table start; the header is padded
            // up to that boundary.
            let tuple_size = 2 * address_size as u64;
            let off = sub_ctx.offset();
            if off % tuple_size != 0 {
                let noff = (off / tuple_size + 1) * tuple_size;
                for _ in off..noff {
                    let Ok(c) = sub_ctx.u8() else {
                        sink.error(
                            Some(&wh),
                            format_args!(
                                ": section ends after the header, but before the first entry.\n"
                            ),
                        );
                        retval = false;
                        break 'table;
                    };
                    if c != 0 {
                        sink.message(
                            Cat::IMPACT_2 | Cat::ARANGES | Cat::HEADER,
                            Some(&wh),
                            format_args!(
                                ": non-zero byte at {:#x} in padding before the first entry.\n",
                                sub_ctx.offset()
                            ),
                        );
                    }
                }
            }

            while !sub_ctx.eof() {
                // Aranges are reported by offset rather than by index;
                // sorting them for index-stable reporting would
                // disturb the memory being checked.
                wh.reset_2(sub_ctx.offset());

                let ctx_offset = sub_ctx.pos() as u64;
                let Ok(mut address) = sub_ctx.var(address_size as usize) else {
                    sink.error(Some(&wh), format_args!(": can't read address field.\n"));
                    retval = false;
                    break 'table;
                };

                let mut address_relocated = false;
                if let Some(r) = rel.next(ctx_offset, &wh, Skip::Mismatched, sink) {
                    address_relocated = true;
                    relocate_one(
                        file,
                        rel,
                        &r,
                        address_size as usize,
                        &mut address,
                        &wh,
                        RelTarget::Address,
                        sink,
                    );
                } else if file.is_rel && address != 0 {
                    sink.message(
                        Cat::IMPACT_2 | Cat::ARANGES | Cat::RELOC,
                        Some(&wh),
                        format_args!(": address field seems to lack a relocation.\n"),
                    );
                }

                let Ok(length) = sub_ctx.var(address_size as usize) else {
                    sink.error(Some(&wh), format_args!(": can't read length field.\n"));
                    retval = false;
                    break 'table;
                };

                if address == 0 && length == 0 && !address_relocated {
                    break;
                }

                if length == 0 {
                    // Each descriptor is a beginning address followed
                    // by the non-zero length of that range.
                    sink.error(Some(&wh), format_args!(": zero-length address range.\n"));
                } else if retval {
                    // Skip coverage analysis if we have errors.
                    if let Some(acov) = &mut aranges_coverage {
                        if acov.is_overlap(address, length) && !tolerant_overlap {
                            // Not a show stopper.
                            sink.message(
                                Cat::ARANGES | Cat::IMPACT_2 | Cat::ERROR,
                                Some(&wh),
                                format_args!(
                                    ": the range [{address:#x}, {:#x}) overlaps with another one.\n",
                                    address + length
                                ),
                            );
                        }
                        acov.add(address, length);
                    }
                }
            }

            if !sub_ctx.eof()
                && !diag::check_zero_padding(
                    &mut sub_ctx,
                    Cat::ARANGES,
                    &Where::new(SecId::Aranges),
                    sink,
                )
            {
                sink.padding_n0(
                    Cat::ARANGES | Cat::ERROR,
                    &Where::new(SecId::Aranges),
                    sub_ctx.offset(),
                    (table_end - table_begin) as u64,
                );
                retval = false;
            }
        }

        if ctx.seek(table_end).is_err() {
            sink.error(Some(&wh), format_args!(": not enough data for next table.\n"));
            return false;
        }
    }

    if let (Some(acov), Some(cov)) = (&aranges_coverage, coverage) {
        compare_coverage(file, cov, acov, SecId::Aranges, "aranges", sink);
    }

    retval
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RefRecord;
    use crate::tests::{minimal_elf64, parse_minimal};

    fn test_cu() -> Cu {
        let mut wh = Where::new(SecId::Info);
        wh.reset_1(0);
        Cu {
            offset: 0,
            cudie_offset: 0xb,
            length: 0x20,
            address_size: 8,
            low_pc: None,
            die_addrs: Default::default(),
            die_refs: RefRecord::default(),
            loc_refs: RefRecord::default(),
            range_refs: RefRecord::default(),
            line_refs: RefRecord::default(),
            wh,
            has_arange: false,
            has_pubnames: false,
            has_pubtypes: false,
        }
    }

    /// One 64-bit-address aranges table: header, padding to 16, then
    /// the given tuples and a terminator.
    fn table(tuples: &[(u64, u64)]) -> Vec<u8> {
        let mut body = vec![];
        body.extend(2u16.to_le_bytes()); // version
        body.extend(0u32.to_le_bytes()); // CU offset
        body.push(8); // address size
        body.push(0); // segment size
        while (body.len() + 4) % 16 != 0 {
            body.push(0); // header padding
        }
        for &(a, l) in tuples {
            body.extend(a.to_le_bytes());
            body.extend(l.to_le_bytes());
        }
        body.extend([0u8; 16]); // terminator tuple

        let mut sec = vec![];
        sec.extend((body.len() as u32).to_le_bytes());
        sec.extend(body);
        sec
    }

    fn run(section: &[u8], cov: Option<&Coverage>) -> (bool, u64, Vec<Cu>) {
        let image = minimal_elf64();
        let mut sink = Sink::default();
        let file = parse_minimal(&image, &mut sink);
        let mut sec = DebugSec {
            id: SecId::Aranges,
            shndx: 0,
            data: crate::elf::SectionData::Borrowed(section),
            rel: Default::default(),
        };
        let mut cus = vec![test_cu()];
        let ok = check_aranges_structural(&file, &mut sec, &mut cus, cov, false, &mut sink);
        (ok, sink.count, cus)
    }

    #[test]
    fn well_formed_table() {
        let section = table(&[(0x400000, 0x80)]);
        let (ok, count, cus) = run(&section, None);
        assert!(ok);
        assert_eq!(count, 0);
        assert!(cus[0].has_arange);
    }

    #[test]
    fn zero_length_range() {
        let section = table(&[(0x400000, 0)]);
        let (_, count, _) = run(&section, None);
        assert_eq!(count, 1);
    }

    #[test]
    fn overlap_against_cu_coverage() {
        // CUs cover [0x400000, 0x400100); aranges only announce the
        // first half, so the second half is flagged.
        let mut cov = Coverage::new();
        cov.add(0x400000, 0x100);

        let section = table(&[(0x400000, 0x80)]);
        let (ok, count, _) = run(&section, Some(&cov));
        assert!(ok);
        // "covered with CUs, but not with aranges" plus the missing
        // containing section.
        assert_eq!(count, 2);
    }

    #[test]
    fn early_terminator_leaves_padding() {
        // Terminator mid-table: what follows is flagged as padding.
        let mut section = table(&[]);
        let len = section.len();
        section.extend([0u8; 16]); // extra zero tuple past terminator
        // Fix the length field to cover the extra bytes.
        let new_len = (len - 4 + 16) as u32;
        section[..4].copy_from_slice(&new_len.to_le_bytes());

        let (ok, count, _) = run(&section, None);
        assert!(ok);
        assert_eq!(count, 1); // unnecessary padding with zero bytes
    }

    #[test]
    fn duplicate_table_for_cu() {
        let mut section = table(&[(0x400000, 0x80)]);
        let second = table(&[(0x500000, 0x80)]);
        section.extend(second);
        let (_, count, _) = run(&section, None);
        assert_eq!(count, 1);
    }

    #[test]
    fn unknown_cu_reference() {
        let mut section = table(&[]);
        // Patch the CU offset to something absent from the chain.
        section[6] = 0x44;
        let (_, count, _) = run(&section, None);
        assert_eq!(count, 1);
    }

    #[test]
    fn address_size_mismatch() {
        let mut section = table(&[]);
        section[10] = 4; // address size now disagrees with the CU
        let (ok, _, _) = run(&section, None);
        assert!(!ok);
    }
}
