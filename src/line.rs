// Copyright The dwarflint Authors
// SPDX-License-Identifier: Apache-2.0

//! Structural validation of `.debug_line`.
//!
//! Each table carries a header (directory and file lists included)
//! followed by a line-number program. The program is not interpreted;
//! it is scanned opcode by opcode so that operand framing, extended
//! opcode lengths, file references, and sequence termination can be
//! verified, and so that the relocation cursor stays in step for
//! `DW_LNE_set_address`.

use crate::diag::{self, Cat, SecId, Sink, Where};
use crate::elf::{DebugSec, ElfData};
use crate::info::Cu;
use crate::readctx::ReadCtx;
use crate::records::AddrRecord;
use crate::reloc::{relocate_one, RelTarget, Skip};

/// An include directory and whether anything referenced it.
struct IncludeDir<'d> {
    name: &'d [u8],
    used: bool,
}

/// A file entry and whether anything referenced it.
struct FileEntry<'d> {
    name: &'d [u8],
    used: bool,
}

fn name_str(name: &[u8]) -> std::borrow::Cow<'_, str> {
    String::from_utf8_lossy(name)
}

/// Read a file entry's directory index, validating it against the
/// directory table.
fn read_directory_index(
    ctx: &mut ReadCtx<'_>,
    dirs: &mut [IncludeDir<'_>],
    file_no: usize,
    name: &[u8],
    wh: &Where,
    retval: &mut bool,
    sink: &mut Sink,
) -> Option<u64> {
    let idx = diag::checked_uleb128(ctx, sink, wh, "directory index")?;

    if name.first() == Some(&b'/') && idx != 0 {
        sink.message(
            Cat::IMPACT_2 | Cat::LINE | Cat::HEADER,
            Some(wh),
            format_args!(": file #{file_no} has absolute pathname, but refers to directory != 0.\n"),
        );
    }
    // Not >=, directories are indexed from 1.
    if idx > dirs.len() as u64 {
        sink.message(
            Cat::IMPACT_4 | Cat::LINE | Cat::HEADER,
            Some(wh),
            format_args!(
                ": file #{file_no} refers to directory #{idx}, which wasn't defined.\n"
            ),
        );
        // A consumer might choke on that.
        *retval = false;
    } else if idx != 0 {
        dirs[idx as usize - 1].used = true;
    }

    Some(idx)
}

/// Mark a file-table entry as referenced by the program.
fn use_file(
    files: &mut [FileEntry<'_>],
    file_idx: u64,
    wh: &Where,
    retval: &mut bool,
    sink: &mut Sink,
) {
    if file_idx == 0 || file_idx > files.len() as u64 {
        sink.error(
            Some(wh),
            format_args!(": DW_LNS_set_file: invalid file index {file_idx}.\n"),
        );
        *retval = false;
    } else {
        files[file_idx as usize - 1].used = true;
    }
}

/// Walk `.debug_line` table by table, then match the CU chain's
/// `DW_AT_stmt_list` references against the table offsets seen.
pub fn check_line_structural(
    file: &ElfData<'_>,
    sec: &mut DebugSec<'_>,
    cus: &[Cu],
    sink: &mut Sink,
) -> bool {
    let DebugSec { data, rel, .. } = sec;
    let data: &[u8] = &**data;
    let mut ctx = ReadCtx::new(data, file.endian);

    let mut retval = true;
    let mut line_tables = AddrRecord::default();

    while !ctx.eof() {
        let mut wh = Where::new(SecId::Line);
        let set_offset = ctx.offset();
        wh.reset_1(set_offset);
        line_tables.add(set_offset);
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
            sink.error(Some(&wh), format_args!(": not enough data for next unit.\n"));
            return false;
        };
        sub_ctx.seek(ctx.pos()).expect("within unit bounds");
        // Report offsets section-relative, the way readelf does.
        sub_ctx.rebase(0);

        'set: {
            let Ok(version) = sub_ctx.u16() else {
                sink.error(Some(&wh), format_args!(": can't read set version.\n"));
                retval = false;
                break 'set;
            };
            if !diag::supported_version(version, &[2, 3], &wh, sink) {
                retval = false;
                break 'set;
            }

            let Ok(header_length) = sub_ctx.dwarf_offset(dwarf_64) else {
                sink.error(Some(&wh), format_args!(": can't read attribute value.\n"));
                retval = false;
                break 'set;
            };
            let program_start = sub_ctx.pos() + header_length as usize;

            let Ok(_min_insn_length) = sub_ctx.u8() else {
                sink.error(
                    Some(&wh),
                    format_args!(": can't read minimum instruction length.\n"),
                );
                retval = false;
                break 'set;
            };

            let Ok(default_is_stmt) = sub_ctx.u8() else {
                sink.error(Some(&wh), format_args!(": can't read default_is_stmt.\n"));
                retval = false;
                break 'set;
            };
            // Booleans in the line table are encoded as 0 or non-zero,
            // but anything other than 0/1 deserves a notice.
            if default_is_stmt > 1 {
                sink.message(
                    Cat::LINE | Cat::IMPACT_2 | Cat::HEADER,
                    Some(&wh),
                    format_args!(": default_is_stmt should be 0 or 1, not {default_is_stmt}.\n"),
                );
            }

            let Ok(_line_base) = sub_ctx.u8().map(|b| b as i8) else {
                sink.error(Some(&wh), format_args!(": can't read line_base.\n"));
                retval = false;
                break 'set;
            };
            let Ok(_line_range) = sub_ctx.u8() else {
                sink.error(Some(&wh), format_args!(": can't read line_range.\n"));
                retval = false;
                break 'set;
            };
            let Ok(mut opcode_base) = sub_ctx.u8() else {
                sink.error(Some(&wh), format_args!(": can't read opcode_base.\n"));
                retval = false;
                break 'set;
            };
            if opcode_base == 0 {
                sink.error(Some(&wh), format_args!(": opcode base set to 0.\n"));
                opcode_base = 1; // opcodes start at 1
            }

            let mut std_opc_lengths = Vec::with_capacity(opcode_base as usize - 1);
            for i in 0..opcode_base as usize - 1 {
                match sub_ctx.u8() {
                    Ok(l) => std_opc_lengths.push(l),
                    Err(_) => {
                        sink.error(
                            Some(&wh),
                            format_args!(": can't read length of standard opcode #{i}.\n"),
                        );
                        retval = false;
                        break 'set;
                    }
                }
            }

            let mut dirs: Vec<IncludeDir<'_>> = Vec::new();
            loop {
                let Ok(name) = sub_ctx.str() else {
                    sink.error(
                        Some(&wh),
                        format_args!(
                            ": can't read name of include directory #{}.\n",
                            dirs.len() + 1 // numbered from 1
                        ),
                    );
                    retval = false;
                    break 'set;
                };
                if name.is_empty() {
                    break;
                }
                dirs.push(IncludeDir { name, used: false });
            }

            let mut files: Vec<FileEntry<'_>> = Vec::new();
            loop {
                let Ok(name) = sub_ctx.str() else {
                    sink.error(
                        Some(&wh),
                        format_args!(": can't read name of file #{}.\n", files.len() + 1),
                    );
                    retval = false;
                    break 'set;
                };
                if name.is_empty() {
                    break;
                }

                if read_directory_index(
                    &mut sub_ctx,
                    &mut dirs,
                    files.len() + 1,
                    name,
                    &wh,
                    &mut retval,
                    sink,
                )
                .is_none()
                {
                    retval = false;
                    break 'set;
                }

                // Modification time and size of the file.
                if diag::checked_uleb128(&mut sub_ctx, sink, &wh, "timestamp of file entry")
                    .is_none()
                    || diag::checked_uleb128(&mut sub_ctx, sink, &wh, "file size of file entry")
                        .is_none()
                {
                    retval = false;
                    break 'set;
                }

                files.push(FileEntry { name, used: false });
            }

            // Skip the rest of the header.
            if sub_ctx.pos() > program_start {
                sink.error(
                    Some(&wh),
                    format_args!(
                        ": header claims that it has a size of {header_length:#x}, but in fact \
                         it has a size of {:#x}.\n",
                        sub_ctx.pos() - program_start + header_length as usize
                    ),
                );
                // Assume the header lies and the program follows here.
                retval = false;
            } else if sub_ctx.pos() < program_start {
                let span = sub_ctx.slice(sub_ctx.pos(), program_start.min(sub_ctx.end()));
                let begin = sub_ctx.offset();
                let end = begin + span.len() as u64;
                if span.iter().all(|&b| b == 0) {
                    sink.padding_0(Cat::LINE | Cat::HEADER, &wh, begin, end);
                } else {
                    sink.padding_n0(Cat::LINE | Cat::HEADER, &Where::new(SecId::Line), begin, end);
                }
                if sub_ctx.seek(program_start.min(sub_ctx.end())).is_err() {
                    retval = false;
                    break 'set;
                }
            }

            let mut terminated = false;
            let mut first_file = true;
            let mut seen_opcode = false;
            while !sub_ctx.eof() {
                wh.reset_2(sub_ctx.offset());
                let Ok(opcode) = sub_ctx.u8() else {
                    sink.error(Some(&wh), format_args!(": can't read opcode.\n"));
                    retval = false;
                    break 'set;
                };

                let mut operands = 0usize;
                let mut extended = 0u8;
                match opcode {
                    // Extended opcodes.
                    0 => {
                        let Some(skip_len) = diag::checked_uleb128(
                            &mut sub_ctx,
                            sink,
                            &wh,
                            "length of extended opcode",
                        ) else {
                            retval = false;
                            break 'set;
                        };
                        let next = sub_ctx.pos().saturating_add(skip_len as usize);
                        match sub_ctx.u8() {
                            Ok(x) => extended = x,
                            Err(_) => {
                                sink.error(
                                    Some(&wh),
                                    format_args!(": can't read extended opcode.\n"),
                                );
                                retval = false;
                                break 'set;
                            }
                        }

                        let mut handled = true;
                        match extended {
                            1 => terminated = true, // DW_LNE_end_sequence

                            // DW_LNE_set_address
                            2 => {
                                let ctx_offset = sub_ctx.pos() as u64;
                                let width = if file.addr_64 { 8 } else { 4 };
                                let Ok(mut addr) = sub_ctx.var(width) else {
                                    sink.error(
                                        Some(&wh),
                                        format_args!(
                                            ": can't read operand of DW_LNE_set_address.\n"
                                        ),
                                    );
                                    retval = false;
                                    break 'set;
                                };

                                if let Some(r) =
                                    rel.next(ctx_offset, &wh, Skip::Mismatched, sink)
                                {
                                    relocate_one(
                                        file,
                                        rel,
                                        &r,
                                        width,
                                        &mut addr,
                                        &wh,
                                        RelTarget::Address,
                                        sink,
                                    );
                                } else if file.is_rel {
                                    sink.message(
                                        Cat::IMPACT_2 | Cat::LINE | Cat::RELOC,
                                        Some(&wh),
                                        format_args!(
                                            ": DW_LNE_set_address seems to lack a relocation.\n"
                                        ),
                                    );
                                }
                            }

                            // DW_LNE_define_file
                            3 => {
                                handled = false;
                                let Ok(name) = sub_ctx.str() else {
                                    sink.error(
                                        Some(&wh),
                                        format_args!(
                                            ": can't read filename operand of \
                                             DW_LNE_define_file.\n"
                                        ),
                                    );
                                    retval = false;
                                    break 'set;
                                };
                                if read_directory_index(
                                    &mut sub_ctx,
                                    &mut dirs,
                                    files.len() + 1,
                                    name,
                                    &wh,
                                    &mut retval,
                                    sink,
                                )
                                .is_none()
                                {
                                    retval = false;
                                    break 'set;
                                }
                                files.push(FileEntry { name, used: false });
                                operands = 2; // mtime & size of the file
                            }

                            _ => {
                                handled = false;
                                sink.message(
                                    Cat::IMPACT_2 | Cat::LINE,
                                    Some(&wh),
                                    format_args!(": unknown extended opcode #{extended}.\n"),
                                );
                            }
                        }

                        if sub_ctx.pos() > next {
                            sink.error(
                                Some(&wh),
                                format_args!(
                                    ": opcode claims that it has a size of {skip_len:#x}, \
                                     but in fact it has a size of {:#x}.\n",
                                    skip_len as usize + (sub_ctx.pos() - next)
                                ),
                            );
                            retval = false;
                        } else if sub_ctx.pos() < next {
                            let upto = next.min(sub_ctx.end());
                            let span = sub_ctx.slice(sub_ctx.pos(), upto);
                            let begin = sub_ctx.offset();
                            let end = begin + span.len() as u64;
                            if handled {
                                if span.iter().all(|&b| b == 0) {
                                    sink.padding_0(Cat::LINE, &wh, begin, end);
                                } else {
                                    sink.padding_n0(
                                        Cat::LINE,
                                        &Where::new(SecId::Line),
                                        begin,
                                        end,
                                    );
                                }
                            }
                            if sub_ctx.seek(upto).is_err() {
                                retval = false;
                                break 'set;
                            }
                        }
                    }

                    // DW_LNS_fixed_advance_pc: the only standard
                    // opcode with a fixed-width operand.
                    9 => {
                        if sub_ctx.u16().is_err() {
                            sink.error(
                                Some(&wh),
                                format_args!(": can't read operand of DW_LNS_fixed_advance_pc.\n"),
                            );
                            retval = false;
                            break 'set;
                        }
                    }

                    // DW_LNS_set_file
                    4 => {
                        let Some(file_idx) = diag::checked_uleb128(
                            &mut sub_ctx,
                            sink,
                            &wh,
                            "DW_LNS_set_file operand",
                        ) else {
                            retval = false;
                            break 'set;
                        };
                        use_file(&mut files, file_idx, &wh, &mut retval, sink);
                        first_file = false;
                    }

                    // DW_LNS_set_isa
                    12 => operands = 1,

                    _ => {
                        if (opcode as usize) < opcode_base as usize {
                            operands = std_opc_lengths[opcode as usize - 1] as usize;
                            if opcode > 12 {
                                sink.message(
                                    Cat::IMPACT_2 | Cat::LINE,
                                    Some(&wh),
                                    format_args!(": unknown standard opcode #{opcode}.\n"),
                                );
                            }
                        }
                        // Opcodes at or above opcode_base are special
                        // opcodes, pure numbers with no operands.
                    }
                }

                for i in 0..operands {
                    let what = if opcode != 0 {
                        format!("operand #{i} of opcode {opcode}")
                    } else {
                        format!("operand #{i} of extended opcode {extended}")
                    };
                    if diag::checked_uleb128(&mut sub_ctx, sink, &wh, &what).is_none() {
                        retval = false;
                        break 'set;
                    }
                }

                if first_file {
                    use_file(&mut files, 1, &wh, &mut retval, sink);
                    first_file = false;
                }

                if opcode != 0 || extended != 1 {
                    seen_opcode = true;
                }
            }

            for (i, dir) in dirs.iter().enumerate() {
                if !dir.used {
                    sink.message(
                        Cat::IMPACT_3 | Cat::BLOAT | Cat::LINE | Cat::HEADER,
                        Some(&wh),
                        format_args!(
                            ": the include #{} `{}' is not used.\n",
                            i + 1,
                            name_str(dir.name)
                        ),
                    );
                }
            }
            for (i, f) in files.iter().enumerate() {
                if !f.used {
                    sink.message(
                        Cat::IMPACT_3 | Cat::BLOAT | Cat::LINE | Cat::HEADER,
                        Some(&wh),
                        format_args!(
                            ": the file #{} `{}' is not used.\n",
                            i + 1,
                            name_str(f.name)
                        ),
                    );
                }
            }

            if !seen_opcode {
                sink.message(
                    Cat::LINE | Cat::BLOAT | Cat::IMPACT_3,
                    Some(&wh),
                    format_args!(": empty line number program.\n"),
                );
            }
            if !terminated {
                if seen_opcode {
                    sink.error(
                        Some(&wh),
                        format_args!(
                            ": sequence of opcodes not terminated with DW_LNE_end_sequence.\n"
                        ),
                    );
                }
            } else if !sub_ctx.eof()
                && !diag::check_zero_padding(
                    &mut sub_ctx,
                    Cat::LINE,
                    &Where::new(SecId::Line),
                    sink,
                )
            {
                sink.padding_n0(
                    Cat::LINE,
                    &Where::new(SecId::Line),
                    sub_ctx.offset(),
                    (set_end - set_begin) as u64,
                );
            }
        }

        if ctx.seek(set_end).is_err() {
            sink.error(Some(&wh), format_args!(": not enough data for next unit.\n"));
            return false;
        }
    }

    if retval {
        rel.skip_rest(SecId::Line, sink);

        for cu in cus {
            for r in &cu.line_refs {
                if !line_tables.contains(r.addr) {
                    sink.error(
                        Some(&r.who),
                        format_args!(
                            ": unresolved reference to .debug_line table {:#x}.\n",
                            r.addr
                        ),
                    );
                }
            }
        }
    }

    retval
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Where;
    use crate::records::RefRecord;
    use crate::tests::{minimal_elf64, parse_minimal};

    /// Assemble one version-2 line table with the standard 12-opcode
    /// header, the given dir/file lists, and program bytes.
    fn table(dirs: &[&[u8]], files: &[(&[u8], u64)], program: &[u8]) -> Vec<u8> {
        let mut header = vec![];
        header.push(1); // min instruction length
        header.push(1); // default_is_stmt
        header.push(0xfb); // line_base -5
        header.push(14); // line_range
        header.push(13); // opcode_base
        header.extend([0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]); // operand counts
        for d in dirs {
            header.extend(*d);
            header.push(0);
        }
        header.push(0);
        for (name, dir) in files {
            header.extend(*name);
            header.push(0);
            header.push(*dir as u8); // dir index, single ULEB byte
            header.push(0); // mtime
            header.push(0); // size
        }
        header.push(0);

        let mut body = vec![];
        body.extend(2u16.to_le_bytes()); // version
        body.extend((header.len() as u32).to_le_bytes()); // header_length
        body.extend(&header);
        body.extend(program);

        let mut sec = vec![];
        sec.extend((body.len() as u32).to_le_bytes());
        sec.extend(body);
        sec
    }

    const END_SEQUENCE: &[u8] = &[0x00, 0x01, 0x01];

    fn run(section: &[u8], cus: &[Cu]) -> (bool, u64) {
        let image = minimal_elf64();
        let mut sink = Sink::default();
        let file = parse_minimal(&image, &mut sink);
        let mut sec = DebugSec {
            id: SecId::Line,
            shndx: 0,
            data: crate::elf::SectionData::Borrowed(section),
            rel: Default::default(),
        };
        let ok = check_line_structural(&file, &mut sec, cus, &mut sink);
        (ok, sink.count)
    }

    #[test]
    fn well_formed_table() {
        // DW_LNS_copy, then end_sequence. The copy marks file #1 used.
        let mut program = vec![0x01];
        program.extend(END_SEQUENCE);
        let section = table(&[], &[(b"a.c", 0)], &program);
        let (ok, count) = run(&section, &[]);
        assert!(ok);
        assert_eq!(count, 0);
    }

    #[test]
    fn unterminated_sequence() {
        let section = table(&[], &[(b"a.c", 0)], &[0x01]); // copy, no end
        let (ok, count) = run(&section, &[]);
        assert!(ok);
        assert_eq!(count, 1);
    }

    #[test]
    fn empty_program_is_bloat() {
        let section = table(&[], &[], &[]);
        let (_, count) = run(&section, &[]);
        assert_eq!(count, 1);
    }

    #[test]
    fn unused_file_and_dir() {
        // end_sequence only: neither the dir nor file #2 gets used.
        let section = table(
            &[b"/usr/include"],
            &[(b"a.c", 0), (b"b.c", 0)],
            END_SEQUENCE,
        );
        let (ok, count) = run(&section, &[]);
        assert!(ok);
        // Unused include, unused file #2, and a program consisting of
        // nothing but the end_sequence counts as empty. File #1 is
        // implicitly used by the first opcode.
        assert_eq!(count, 3);
    }

    #[test]
    fn set_file_out_of_range() {
        // DW_LNS_set_file 7 with a single-file table.
        let mut program = vec![0x04, 0x07];
        program.extend(END_SEQUENCE);
        let section = table(&[], &[(b"a.c", 0)], &program);
        let (ok, count) = run(&section, &[]);
        assert!(!ok);
        // Invalid file index, and file #1 ends up unused.
        assert_eq!(count, 2);
    }

    #[test]
    fn bad_directory_index() {
        let section = table(&[], &[(b"a.c", 3)], END_SEQUENCE);
        let (ok, count) = run(&section, &[]);
        assert!(!ok);
        assert!(count >= 1);
    }

    #[test]
    fn extended_opcode_length_mismatch() {
        // A copy, then end_sequence announced with length 4.
        let mut program = vec![0x01, 0x00, 0x04, 0x01];
        program.extend([0, 0, 0]); // claimed-but-unused payload
        let section = table(&[], &[(b"a.c", 0)], &program);
        let (ok, count) = run(&section, &[]);
        assert!(ok);
        // Trailing zero payload after a handled opcode is padding.
        assert_eq!(count, 1);
    }

    #[test]
    fn unresolved_stmt_list_reference() {
        let mut program = vec![0x01];
        program.extend(END_SEQUENCE);
        let section = table(&[], &[(b"a.c", 0)], &program);

        let mut wh = Where::new(SecId::Info);
        wh.reset_1(0);
        let mut cu = Cu {
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
            wh: wh.clone(),
            has_arange: false,
            has_pubnames: false,
            has_pubtypes: false,
        };
        cu.line_refs.add(0x1000, &wh); // no table starts there

        let (ok, count) = run(&section, &[cu]);
        assert!(ok);
        assert_eq!(count, 1);
    }
}
