// Copyright The dwarflint Authors
// SPDX-License-Identifier: Apache-2.0

//! Coverage tracking across the allocated sections of an ELF file.
//!
//! Used to compare address ranges claimed by DWARF data against the
//! sections that actually occupy the address space: ranges must fall
//! into allocated sections, should not straddle section boundaries,
//! and the executable sections are expected to end up fully covered.

use crate::coverage::Coverage;
use crate::diag::{Cat, Sink, Where};
use crate::elf::{necessary_alignment, Sec, SHF_EXECINSTR};

/// Per-section coverage bookkeeping.
#[derive(Debug)]
pub struct SectionCoverage {
    /// Index of the section in the file's section table.
    pub shndx: usize,
    /// Covered byte ranges, section-relative.
    pub cov: Coverage,
    /// Whether any range touched this section.
    pub hit: bool,
    /// Section matched only the warn mask; ranges falling here are
    /// reported.
    pub warn: bool,
}

/// Coverage map over the sections selected by a flag mask.
#[derive(Debug)]
pub struct CoverageMap {
    scos: Vec<SectionCoverage>,
    allow_overlap: bool,
}

impl CoverageMap {
    /// Build a map from the sections whose flags contain `mask`
    /// (normal) or `warn_mask` (warn-only), ordered by address.
    pub fn new(sections: &[Sec], mask: u64, warn_mask: u64, allow_overlap: bool) -> CoverageMap {
        let mut scos: Vec<SectionCoverage> = sections
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(i, sec)| {
                let normal = sec.flags & mask == mask;
                let warn = sec.flags & warn_mask == warn_mask;
                (normal || warn).then_some(SectionCoverage {
                    shndx: i,
                    cov: Coverage::new(),
                    hit: false,
                    warn: !normal,
                })
            })
            .collect();
        scos.sort_by_key(|s| sections[s.shndx].addr);
        CoverageMap {
            scos,
            allow_overlap,
        }
    }

    /// Distribute `[address, address + length)` over the sections it
    /// intersects, reporting boundary straddles, overlaps, and any
    /// sliver that falls into no mapped section.
    pub fn add(
        &mut self,
        sections: &[Sec],
        address: u64,
        length: u64,
        wh: &Where,
        cat: Cat,
        sink: &mut Sink,
    ) {
        let end = address.saturating_add(length);
        let mut found = false;
        let mut crosses_boundary = false;
        let mut overlap = false;

        // Tracks how much of the input range lands in mapped
        // sections; what is left uncovered falls nowhere and is
        // reported below.
        let mut range_cov = Coverage::new();

        for sco in &mut self.scos {
            let sec = &sections[sco.shndx];
            let s_end = sec.addr + sec.size;
            if end <= sec.addr || address >= s_end {
                continue;
            }

            if found && !crosses_boundary {
                // While probably not an error, it's very suspicious.
                sink.message(
                    cat | Cat::IMPACT_2,
                    Some(wh),
                    format_args!(
                        ": the range [{address:#x}, {end:#x}) crosses section boundaries.\n"
                    ),
                );
                crosses_boundary = true;
            }

            found = true;

            if length == 0 {
                // Empty range: no coverage, and no further section can
                // contain it either.
                break;
            }

            let cov_begin = address.saturating_sub(sec.addr);
            let cov_end = if end < s_end { end - sec.addr } else { sec.size };

            if !overlap
                && !self.allow_overlap
                && sco.cov.is_overlap(cov_begin, cov_end - cov_begin)
            {
                // Not a show stopper.
                sink.message(
                    cat | Cat::IMPACT_2 | Cat::ERROR,
                    Some(wh),
                    format_args!(
                        ": the range [{address:#x}, {end:#x}) overlaps with another one.\n"
                    ),
                );
                overlap = true;
            }

            if sco.warn {
                sink.message(
                    cat | Cat::IMPACT_2,
                    Some(wh),
                    format_args!(
                        ": the range [{address:#x}, {end:#x}) covers section {}.\n",
                        sec.name
                    ),
                );
            }

            sco.cov.add(cov_begin, cov_end - cov_begin);
            sco.hit = true;

            let r_begin = cov_begin + sec.addr - address;
            range_cov.add(r_begin, cov_end - cov_begin);
        }

        if !found {
            // Not a show stopper.
            sink.error(
                Some(wh),
                format_args!(
                    ": couldn't find a section that the range [{address:#x}, {end:#x}) covers.\n"
                ),
            );
        } else if length > 0 {
            range_cov.find_holes(0, length, |h_start, h_len| {
                sink.error(
                    Some(wh),
                    format_args!(
                        ": portion [{:#x}, {:#x}) of the range [{address:#x}, {end:#x}) \
                         doesn't fall into any ALLOC section.\n",
                        h_start + address,
                        h_start + address + h_len
                    ),
                );
                true
            });
        }
    }

    /// Report uncovered holes per section.
    ///
    /// Sections that were never hit are only interesting when they are
    /// executable and not one of the runtime stubs; all-zero holes and
    /// plain alignment padding are accepted.
    pub fn find_holes<'d>(
        &self,
        sections: &[Sec],
        is_rel: bool,
        data_for: impl Fn(usize) -> Option<&'d [u8]>,
        cat: Cat,
        wh: &Where,
        sink: &mut Sink,
    ) {
        for sco in &self.scos {
            let sec = &sections[sco.shndx];

            if !sco.hit
                && (sec.flags & SHF_EXECINSTR == 0
                    || matches!(sec.name.as_str(), ".init" | ".fini" | ".plt"))
            {
                continue;
            }

            // For REL files, don't print addresses mangled by our
            // synthetic layout.
            let base = if is_rel { 0 } else { sec.addr };
            let data = data_for(sco.shndx);

            sco.cov.find_holes(0, sec.size, |begin, len| {
                let end = begin + len;
                if let Some(data) = data {
                    // Filled with NUL bytes: nothing to see.
                    if data
                        .get(begin as usize..end as usize)
                        .is_some_and(|b| b.iter().all(|&x| x == 0))
                    {
                        return true;
                    }
                } else if necessary_alignment(base + begin, len, sec.align) {
                    // Stripped file; tolerate what looks like
                    // alignment padding.
                    return true;
                }

                sink.message(
                    cat | Cat::SUBOPTIMAL | Cat::IMPACT_4,
                    Some(wh),
                    format_args!(
                        ": addresses [{:#x}, {:#x}) of section {} are not covered.\n",
                        begin + base,
                        end + base,
                        sec.name
                    ),
                );
                true
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::SecId;
    use crate::elf::SHF_ALLOC;

    fn sections() -> Vec<Sec> {
        let mk = |name: &str, addr, size, flags| Sec {
            name: name.into(),
            id: None,
            addr,
            size,
            flags,
            align: 8,
        };
        vec![
            mk("", 0, 0, 0),
            mk(".text", 0x1000, 0x100, SHF_ALLOC | SHF_EXECINSTR),
            mk(".rodata", 0x1100, 0x100, SHF_ALLOC),
            mk(".comment", 0, 0x40, 0),
        ]
    }

    fn exec_map(sections: &[Sec]) -> CoverageMap {
        CoverageMap::new(sections, SHF_ALLOC | SHF_EXECINSTR, SHF_ALLOC, false)
    }

    #[test]
    fn selects_by_mask() {
        let secs = sections();
        let map = exec_map(&secs);
        assert_eq!(map.scos.len(), 2);
        assert!(!map.scos[0].warn); // .text matches the full mask
        assert!(map.scos[1].warn); // .rodata only matches ALLOC
    }

    #[test]
    fn straddle_and_miss() {
        let secs = sections();
        let mut map = exec_map(&secs);
        let wh = Where::new(SecId::Ranges);
        let mut sink = Sink::default();

        // Entirely inside .text.
        map.add(&secs, 0x1000, 0x80, &wh, Cat::RANGES, &mut sink);
        assert_eq!(sink.count, 0);

        // Straddles .text/.rodata, and .rodata is warn-only.
        map.add(&secs, 0x10f0, 0x20, &wh, Cat::RANGES, &mut sink);
        assert_eq!(sink.count, 2);

        // Falls into no section at all.
        sink.count = 0;
        map.add(&secs, 0x4000, 0x10, &wh, Cat::RANGES, &mut sink);
        assert_eq!(sink.count, 1);
    }

    #[test]
    fn overlapping_ranges_flagged() {
        let secs = sections();
        let mut map = exec_map(&secs);
        let wh = Where::new(SecId::Ranges);
        let mut sink = Sink::default();

        map.add(&secs, 0x1000, 0x10, &wh, Cat::RANGES, &mut sink);
        map.add(&secs, 0x1008, 0x10, &wh, Cat::RANGES, &mut sink);
        assert_eq!(sink.count, 1);
    }

    #[test]
    fn hole_reporting() {
        let secs = sections();
        let mut map = exec_map(&secs);
        let wh = Where::new(SecId::Ranges);
        let mut sink = Sink::default();

        map.add(&secs, 0x1000, 0x40, &wh, Cat::RANGES, &mut sink);
        map.add(&secs, 0x1080, 0x80, &wh, Cat::RANGES, &mut sink);
        assert_eq!(sink.count, 0);

        // .text bytes are non-zero, so the gap gets reported; the
        // never-hit warn-only .rodata stays quiet.
        let text = vec![0xccu8; 0x100];
        map.find_holes(
            &secs,
            false,
            |ndx| (ndx == 1).then_some(&text[..]),
            Cat::RANGES,
            &wh,
            &mut sink,
        );
        assert_eq!(sink.count, 1);
    }
}
