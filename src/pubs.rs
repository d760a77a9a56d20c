// Copyright The dwarflint Authors
// SPDX-License-Identifier: Apache-2.0

//! Structural validation of `.debug_pubnames` and `.debug_pubtypes`.
//!
//! Both sections share one format: per-CU sets of `(offset, name)`
//! records terminated by a zero offset. Each record's offset must name
//! a DIE that the info walker actually saw begin at that position.

use crate::diag::{self, Cat, SecId, Sink, Where};
use crate::elf::{DebugSec, ElfData};
use crate::info::{find_cu_mut, Cu};
use crate::readctx::ReadCtx;
use crate::reloc::{relocate_one, RelTarget, Skip};

/// Walk a pub section set by set.
pub fn check_pub_structural(
    file: &ElfData<'_>,
    sec: &mut DebugSec<'_>,
    cus: &mut [Cu],
    sink: &mut Sink,
) -> bool {
    debug_assert!(matches!(sec.id, SecId::Pubnames | SecId::Pubtypes));
    let sec_id = sec.id;

    let DebugSec { data, rel, .. } = sec;
    let data: &[u8] = &**data;
    let mut ctx = ReadCtx::new(data, file.endian);

    let mut retval = true;

    while !ctx.eof() {
        let mut wh = Where::new(sec_id);
        wh.reset_1(ctx.offset());
        let set_begin = ctx.pos();

        let Ok(size32) = ctx.u32() else {
            sink.error(Some(&wh), format_args!(": can't read table length.\n"));
            return false;
        };
        let Some((size, dwarf_64)) = diag::read_initial_length(&mut ctx, size32, sink, &wh)
        else {
            return false;
        };

        let set_end = ctx.pos() + size as usize;
        let Ok(mut sub_ctx) = ctx.sub(set_begin, set_end) else {
            sink.error(Some(&wh), format_args!(": not enough data for next set.\n"));
            return false;
        };
        sub_ctx.seek(ctx.pos()).expect("within set bounds");

        'set: {
            let Ok(version) = sub_ctx.u16() else {
                sink.error(Some(&wh), format_args!(": can't read set version.\n"));
                retval = false;
                break 'set;
            };
            if !diag::supported_version(version, &[2], &wh, sink) {
                retval = false;
                break 'set;
            }

            // Offset of the related CU.
            let ctx_offset = sub_ctx.pos() as u64;
            let Ok(mut cu_offset) = sub_ctx.dwarf_offset(dwarf_64) else {
                sink.error(Some(&wh), format_args!(": can't read debug info offset.\n"));
                retval = false;
                break 'set;
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
                    Cat::IMPACT_2 | Cat::PUBTABLES | Cat::RELOC | Cat::HEADER,
                    Some(&wh),
                    format_args!(": debug info offset seems to lack a relocation.\n"),
                );
            }

            let mut cu = if cus.is_empty() {
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

            if let Some(cu) = &mut cu {
                wh.reference = Some(Box::new(cu.wh.clone()));
                let has = if sec_id == SecId::Pubnames {
                    &mut cu.has_pubnames
                } else {
                    &mut cu.has_pubtypes
                };
                if *has {
                    sink.message(
                        Cat::IMPACT_2 | Cat::PUBTABLES | Cat::HEADER,
                        Some(&wh),
                        format_args!(": there has already been section for this CU.\n"),
                    );
                } else {
                    *has = true;
                }
            }

            // Length of the CU the set covers.
            let Ok(cu_len) = sub_ctx.dwarf_offset(dwarf_64) else {
                sink.error(Some(&wh), format_args!(": can't read covered length.\n"));
                retval = false;
                break 'set;
            };
            if let Some(cu) = &cu {
                if cu_len != cu.length {
                    sink.error(
                        Some(&wh),
                        format_args!(
                            ": the table covers length {cu_len} but CU has length {}.\n",
                            cu.length
                        ),
                    );
                    retval = false;
                    break 'set;
                }
            }

            // Records.
            while !sub_ctx.eof() {
                wh.reset_2(sub_ctx.offset());

                let Ok(offset) = sub_ctx.dwarf_offset(dwarf_64) else {
                    sink.error(Some(&wh), format_args!(": can't read offset field.\n"));
                    retval = false;
                    break 'set;
                };
                if offset == 0 {
                    break;
                }

                if let Some(cu) = &cu {
                    if !cu.die_addrs.contains(offset + cu.offset) {
                        sink.error(
                            Some(&wh),
                            format_args!(": unresolved reference to DIE {offset:#x}.\n"),
                        );
                        retval = false;
                        break 'set;
                    }
                }

                if sub_ctx.str().is_err() {
                    sink.error(Some(&wh), format_args!(": can't read symbol name.\n"));
                    retval = false;
                    break 'set;
                }
            }

            if !sub_ctx.eof()
                && !diag::check_zero_padding(
                    &mut sub_ctx,
                    Cat::PUBTABLES,
                    &Where::new(sec_id),
                    sink,
                )
            {
                sink.padding_n0(
                    Cat::PUBTABLES | Cat::ERROR,
                    &Where::new(sec_id),
                    sub_ctx.offset(),
                    (set_end - set_begin) as u64,
                );
                retval = false;
            }
        }

        if ctx.seek(set_end).is_err() {
            sink.error(Some(&wh), format_args!(": not enough data for next set.\n"));
            return false;
        }
    }

    if retval {
        rel.skip_rest(sec_id, sink);
    }

    retval
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RefRecord;
    use crate::tests::{minimal_elf64, parse_minimal};

    fn test_cu(cu_length: u64) -> Cu {
        let mut wh = Where::new(SecId::Info);
        wh.reset_1(0);
        let mut cu = Cu {
            offset: 0,
            cudie_offset: 0xb,
            length: cu_length,
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
        };
        cu.die_addrs.add(0xb);
        cu.die_addrs.add(0x1a);
        cu
    }

    /// One 32-bit pub set for the CU at offset 0.
    fn set(cu_length: u32, records: &[(u32, &[u8])]) -> Vec<u8> {
        let mut body = vec![];
        body.extend(2u16.to_le_bytes()); // version
        body.extend(0u32.to_le_bytes()); // CU offset
        body.extend(cu_length.to_le_bytes());
        for (off, name) in records {
            body.extend(off.to_le_bytes());
            body.extend(*name);
            body.push(0);
        }
        body.extend(0u32.to_le_bytes()); // terminating record

        let mut sec = vec![];
        sec.extend((body.len() as u32).to_le_bytes());
        sec.extend(body);
        sec
    }

    fn run(section: &[u8]) -> (bool, u64, Vec<Cu>) {
        let image = minimal_elf64();
        let mut sink = Sink::default();
        let file = parse_minimal(&image, &mut sink);
        let mut sec = DebugSec {
            id: SecId::Pubnames,
            shndx: 0,
            data: crate::elf::SectionData::Borrowed(section),
            rel: Default::default(),
        };
        let mut cus = vec![test_cu(0x30)];
        let ok = check_pub_structural(&file, &mut sec, &mut cus, &mut sink);
        (ok, sink.count, cus)
    }

    #[test]
    fn well_formed_set() {
        let section = set(0x30, &[(0x1a, b"main")]);
        let (ok, count, cus) = run(&section);
        assert!(ok);
        assert_eq!(count, 0);
        assert!(cus[0].has_pubnames);
        assert!(!cus[0].has_pubtypes);
    }

    #[test]
    fn cu_length_mismatch() {
        let section = set(0x31, &[(0x1a, b"main")]);
        let (ok, count, _) = run(&section);
        assert!(!ok);
        assert_eq!(count, 1);
    }

    #[test]
    fn record_must_name_a_die() {
        // 0x15 is not a recorded DIE start.
        let section = set(0x30, &[(0x15, b"ghost")]);
        let (ok, count, _) = run(&section);
        assert!(!ok);
        assert_eq!(count, 1);
    }

    #[test]
    fn duplicate_set_for_cu() {
        let mut section = set(0x30, &[(0x1a, b"main")]);
        section.extend(set(0x30, &[(0xb, b"other")]));
        let (ok, count, _) = run(&section);
        assert!(ok);
        assert_eq!(count, 1);
    }

    #[test]
    fn unknown_cu() {
        let mut section = set(0x30, &[]);
        section[6] = 0x44; // CU offset now resolves nowhere
        let (_, count, _) = run(&section);
        assert_eq!(count, 1);
    }
}
