// Copyright The dwarflint Authors
// SPDX-License-Identifier: Apache-2.0

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod abbrev;
pub mod aranges;
pub mod coverage;
pub mod covmap;
pub mod dbglog;
pub mod diag;
pub mod elf;
pub mod info;
pub mod line;
pub mod locexpr;
pub mod locranges;
pub mod pubs;
pub mod readctx;
pub mod records;
pub mod reloc;

use crate::diag::{Cat, SecId, Sink, Where};
use crate::elf::{DebugSec, ElfData};
use crate::info::{Cu, CuCoverage};
use crate::readctx::ReadCtx;

/// Type-erased error type.
///
/// We primarily use this to hand out errors from third-party libraries where
/// lifting them into distinct error variants didn't make sense because no
/// consumer cares about differentiating between different error variants.
pub type AnyError = Box<dyn std::error::Error + Send + Sync>;

/// Knobs that change what the structural checks tolerate.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Accept files without DWARF sections silently (`-i`).
    pub tolerate_nodebug: bool,

    /// Don't flag overlapping aranges; GNU toolchains produce them
    /// (`--gnu` / `--tolerant`).
    pub tolerant_overlap: bool,

    /// Compare `.debug_ranges` contents against the allocated ELF
    /// sections. Expensive and chatty, so off by default.
    pub range_coverage: bool,
}

/// Borrow one debug section mutably and, optionally, a second one
/// immutably.
fn sec_pair<'a, 'd>(
    secs: &'a mut [DebugSec<'d>],
    main: usize,
    other: Option<usize>,
) -> (&'a mut DebugSec<'d>, Option<&'a DebugSec<'d>>) {
    match other {
        None => (&mut secs[main], None),
        Some(o) if o > main => {
            let (a, b) = secs.split_at_mut(o);
            (&mut a[main], Some(&b[0]))
        }
        Some(o) => {
            debug_assert_ne!(o, main);
            let (a, b) = secs.split_at_mut(main);
            (&mut b[0], Some(&a[o]))
        }
    }
}

/// Run every structural check applicable to one input file.
///
/// Diagnostics flow through `sink`; the per-section checks degrade
/// independently, so a broken `.debug_info` still lets the purely
/// tabular sections be validated.
pub fn check_file(file: &ElfData<'_>, opts: &Options, sink: &mut Sink) -> elf::Result<()> {
    let mut debug = file.load_debug_sections(sink)?;
    let find = |secs: &[DebugSec<'_>], id: SecId| secs.iter().position(|d| d.id == id);

    // Abbreviations first; nothing in .debug_info can be decoded
    // without them.
    let abbrev_chain = match find(&debug, SecId::Abbrev) {
        Some(i) => {
            let mut ctx = ReadCtx::new(&debug[i].data, file.endian);
            abbrev::load(&mut ctx, sink).ok()
        }
        None => {
            if !opts.tolerate_nodebug {
                // Hard error, not a message. We can't debug without this.
                sink.error(None, format_args!(".debug_abbrev data not found.\n"));
            }
            None
        }
    };

    let mut cu_cov = CuCoverage::default();
    let mut cus: Option<Vec<Cu>> = None;

    if let Some(chain) = &abbrev_chain {
        match find(&debug, SecId::Info) {
            Some(i) => {
                let str_idx = find(&debug, SecId::Str);
                let (info_sec, str_sec) = sec_pair(&mut debug, i, str_idx);
                let strings = str_sec.map(|s| &*s.data);
                cus = info::check_info_structural(
                    file,
                    info_sec,
                    chain,
                    strings,
                    &mut cu_cov,
                    sink,
                );
            }
            None => {
                if !opts.tolerate_nodebug {
                    sink.error(None, format_args!(".debug_info data not found.\n"));
                }
            }
        }
    }

    if let (Some(i), Some(cus)) = (find(&debug, SecId::Ranges), &cus) {
        locranges::check_loc_or_range_structural(
            file,
            &mut debug[i],
            cus,
            Some(&mut cu_cov),
            opts.range_coverage,
            sink,
        );
    }

    if let (Some(i), Some(cus)) = (find(&debug, SecId::Loc), &cus) {
        locranges::check_loc_or_range_structural(file, &mut debug[i], cus, None, false, sink);
    }

    if let Some(i) = find(&debug, SecId::Aranges) {
        // If range data was needed but never fused in, the CU coverage
        // is incomplete; don't compare against it.
        let coverage = (cus.is_some() && !cu_cov.need_ranges).then_some(&cu_cov.cov);
        aranges::check_aranges_structural(
            file,
            &mut debug[i],
            cus.as_deref_mut().unwrap_or(&mut []),
            coverage,
            opts.tolerant_overlap,
            sink,
        );
    }

    for (id, extra) in [
        (SecId::Pubnames, Cat::NONE),
        (SecId::Pubtypes, Cat::PUBTYPES),
    ] {
        match find(&debug, id) {
            Some(i) => {
                pubs::check_pub_structural(
                    file,
                    &mut debug[i],
                    cus.as_deref_mut().unwrap_or(&mut []),
                    sink,
                );
            }
            None => {
                if !opts.tolerate_nodebug {
                    sink.message(
                        Cat::IMPACT_4 | Cat::SUBOPTIMAL | Cat::ELF | extra,
                        Some(&Where::new(id)),
                        format_args!(": data not found.\n"),
                    );
                }
            }
        }
    }

    match find(&debug, SecId::Line) {
        Some(i) => {
            line::check_line_structural(file, &mut debug[i], cus.as_deref().unwrap_or(&[]), sink);
        }
        None => {
            if !opts.tolerate_nodebug {
                sink.message(
                    Cat::IMPACT_4 | Cat::SUBOPTIMAL | Cat::ELF | Cat::LINE,
                    Some(&Where::new(SecId::Line)),
                    format_args!(": data not found.\n"),
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::diag::Sink;
    use crate::elf::{self, ElfData};

    fn elf64_header(e_type: u16) -> Vec<u8> {
        let mut e = vec![0u8; 64];
        e[..4].copy_from_slice(b"\x7fELF");
        e[4] = 2; // ELFCLASS64
        e[5] = 1; // ELFDATA2LSB
        e[6] = 1; // EV_CURRENT
        e[16..18].copy_from_slice(&e_type.to_le_bytes());
        e[18..20].copy_from_slice(&62u16.to_le_bytes()); // EM_X86_64
        e[20..24].copy_from_slice(&1u32.to_le_bytes());
        e[52..54].copy_from_slice(&64u16.to_le_bytes()); // e_ehsize
        e[58..60].copy_from_slice(&64u16.to_le_bytes()); // e_shentsize
        e
    }

    /// Sectionless 64-bit LE executable image; enough to give the
    /// checkers an [`ElfData`] to hang off.
    pub fn minimal_elf64() -> Vec<u8> {
        elf64_header(2) // ET_EXEC
    }

    /// Like [`minimal_elf64`], but `ET_REL`.
    pub fn minimal_elf64_rel() -> Vec<u8> {
        elf64_header(1)
    }

    pub fn parse_minimal<'d>(image: &'d [u8], sink: &mut Sink) -> ElfData<'d> {
        elf::parse_bytes(image, sink).expect("synthetic image parses")
    }
}
