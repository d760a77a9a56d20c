// Copyright The dwarflint Authors
// SPDX-License-Identifier: Apache-2.0

//! `.debug_abbrev` loading and validation.
//!
//! The section holds a sequence of abbreviation tables, each a run of
//! entries terminated by a zero code. Tables are keyed by their start
//! offset; CU headers refer to them by that offset. Besides building
//! the tables this pass checks form/attribute pairings that the DIE
//! walker later relies on (sibling form class, location form class,
//! low/high PC pairing).

#![allow(non_upper_case_globals)]

use crate::diag::{self, Cat, SecId, Sink, Where};
use crate::readctx::ReadCtx;

use gimli::constants::*;
use smallvec::SmallVec;
use std::cell::Cell;

/// Giving up on the section; downstream checks that need abbrevs
/// cannot run.
#[derive(Debug, thiserror::Error)]
#[error(".debug_abbrev is structurally unusable")]
pub struct Bail;

/// One attribute spec of an abbreviation.
#[derive(Debug, Clone)]
pub struct AbbrevAttrib {
    /// Attribute name.
    pub name: DwAt,
    /// Attribute form.
    pub form: DwForm,
    /// Location of the spec, for diagnostics.
    pub wh: Where,
}

/// One abbreviation entry.
#[derive(Debug, Clone)]
pub struct Abbrev {
    /// Abbreviation code, referenced from DIEs.
    pub code: u64,
    /// DIE tag.
    pub tag: DwTag,
    /// Whether DIEs using this abbreviation have children.
    pub has_children: bool,
    /// Attribute specs in declaration order.
    pub attribs: SmallVec<[AbbrevAttrib; 8]>,
    /// Location of the entry, for diagnostics.
    pub wh: Where,
    /// Set once some DIE uses this abbreviation.
    pub used: Cell<bool>,
}

/// One abbreviation table, keyed by its section offset.
#[derive(Debug, Clone)]
pub struct AbbrevTable {
    /// Offset of the table within `.debug_abbrev`.
    pub offset: u64,
    /// Entries sorted by code for binary lookup.
    pub abbrevs: Vec<Abbrev>,
}

impl AbbrevTable {
    /// Look up an abbreviation by code.
    pub fn find(&self, code: u64) -> Option<&Abbrev> {
        self.abbrevs
            .binary_search_by_key(&code, |a| a.code)
            .ok()
            .map(|i| &self.abbrevs[i])
    }
}

/// All abbreviation tables of a file.
#[derive(Debug, Clone, Default)]
pub struct AbbrevChain {
    /// Tables in file order.
    pub tables: Vec<AbbrevTable>,
}

impl AbbrevChain {
    /// Look up the table starting at `offset`.
    pub fn find_table(&self, offset: u64) -> Option<&AbbrevTable> {
        self.tables.iter().find(|t| t.offset == offset)
    }
}

/// Validity of a form used with `DW_AT_sibling`.
enum SiblingForm {
    Ok,
    /// `DW_FORM_ref_addr`: legal but suspicious for a sibling.
    RefAddr,
    /// Not a reference form at all.
    Bad,
}

fn check_sibling_form(form: DwForm) -> SiblingForm {
    match form {
        // Indirect is tolerated here; the dereferenced form is checked
        // during DIE loading.
        DW_FORM_indirect
        | DW_FORM_ref1
        | DW_FORM_ref2
        | DW_FORM_ref4
        | DW_FORM_ref8
        | DW_FORM_ref_udata => SiblingForm::Ok,

        DW_FORM_ref_addr => SiblingForm::RefAddr,

        _ => SiblingForm::Bad,
    }
}

/// Attributes whose value is a location: an expression block or a
/// `.debug_loc` pointer.
pub fn is_location_attrib(name: DwAt) -> bool {
    matches!(
        name,
        DW_AT_location | DW_AT_frame_base | DW_AT_data_location | DW_AT_data_member_location
    )
}

fn location_form_valid(form: DwForm) -> bool {
    matches!(
        form,
        DW_FORM_indirect
            | DW_FORM_data4
            | DW_FORM_data8
            | DW_FORM_block1
            | DW_FORM_block2
            | DW_FORM_block4
            | DW_FORM_block
    )
}

fn attrib_form_valid(form: u64) -> bool {
    form > 0 && form <= DW_FORM_indirect.0 as u64
}

/// Parse `.debug_abbrev` into a chain of tables.
///
/// Returns [`Bail`] when the section is too broken to be useful; the
/// caller then skips `.debug_info` checking entirely.
pub fn load(ctx: &mut ReadCtx<'_>, sink: &mut Sink) -> Result<AbbrevChain, Bail> {
    let mut chain = AbbrevChain::default();
    let mut table: Option<AbbrevTable> = None;
    let mut first_attr_off: Option<u64> = None;

    let mut wh = Where::new(SecId::Abbrev);
    wh.reset_1(0);

    loop {
        // Scan for the next entry. A run of zero codes terminates the
        // current table; a second consecutive zero begins padding.
        let mut abbr_off;
        let abbr_code;
        {
            let mut prev_code = None;
            let mut zero_seq_off = None;

            loop {
                if ctx.eof() {
                    abbr_off = ctx.offset();
                    abbr_code = None;
                    if let Some(z) = zero_seq_off {
                        sink.padding_0(
                            Cat::ABBREVS | Cat::HEADER,
                            &Where::new(SecId::Abbrev),
                            z,
                            abbr_off,
                        );
                    }
                    break;
                }

                abbr_off = ctx.offset();
                wh.reset_2(abbr_off);

                let Some(code) = diag::checked_uleb128(ctx, sink, &wh, "abbrev code") else {
                    flush_tables(&mut chain, &mut table);
                    return Err(Bail);
                };

                if code == 0 && prev_code == Some(0) && zero_seq_off.is_none() {
                    zero_seq_off = Some(abbr_off);
                }

                if code != 0 {
                    if let Some(z) = zero_seq_off {
                        sink.padding_0(
                            Cat::ABBREVS | Cat::HEADER,
                            &Where::new(SecId::Abbrev),
                            z,
                            abbr_off,
                        );
                    }
                    abbr_code = Some(code);
                    break;
                }

                // Zero code: the current table (if any) has ended.
                flush_tables(&mut chain, &mut table);
                prev_code = Some(code);
            }
        }

        let Some(abbr_code) = abbr_code else {
            break;
        };

        if table.is_none() {
            wh.reset_1(abbr_off);
            wh.reset_2(abbr_off);
            table = Some(AbbrevTable {
                offset: abbr_off,
                abbrevs: Vec::new(),
            });
        }

        let duplicate_of = table
            .as_ref()
            .expect("ensured above")
            .abbrevs
            .iter()
            .find(|a| a.code == abbr_code)
            .map(|a| a.wh.clone());
        if let Some(original) = &duplicate_of {
            sink.error(
                Some(&wh),
                format_args!(
                    ": duplicate abbrev code {abbr_code}; already defined at {original}.\n"
                ),
            );
        }

        let mut cur = Abbrev {
            code: abbr_code,
            tag: DwTag(0),
            has_children: false,
            attribs: SmallVec::new(),
            wh: wh.clone(),
            used: Cell::new(false),
        };

        let Some(tag) = diag::checked_uleb128(ctx, sink, &wh, "abbrev tag") else {
            flush_tables(&mut chain, &mut table);
            return Err(Bail);
        };
        if tag > DW_TAG_hi_user.0 as u64 {
            sink.error(Some(&wh), format_args!(": invalid abbrev tag {tag:#x}.\n"));
            flush_tables(&mut chain, &mut table);
            return Err(Bail);
        }
        cur.tag = DwTag(tag as u16);

        let Ok(has_children) = ctx.u8() else {
            sink.error(Some(&wh), format_args!(": can't read abbrev has_children.\n"));
            flush_tables(&mut chain, &mut table);
            return Err(Bail);
        };
        if has_children != DW_CHILDREN_no.0 && has_children != DW_CHILDREN_yes.0 {
            sink.error(
                Some(&wh),
                format_args!(": invalid has_children value {has_children:#x}.\n"),
            );
            flush_tables(&mut chain, &mut table);
            return Err(Bail);
        }
        cur.has_children = has_children == DW_CHILDREN_yes.0;

        let mut sibling_attr: Option<u64> = None;
        let mut low_pc = false;
        let mut high_pc = false;
        let mut ranges = false;

        loop {
            let attr_off = ctx.offset();
            let rel_off = attr_off - *first_attr_off.get_or_insert(attr_off);
            wh.reset_3(rel_off);

            let Some(attrib_name) = diag::checked_uleb128(ctx, sink, &wh, "attribute name")
            else {
                flush_tables(&mut chain, &mut table);
                return Err(Bail);
            };
            let Some(attrib_form) = diag::checked_uleb128(ctx, sink, &wh, "attribute form")
            else {
                flush_tables(&mut chain, &mut table);
                return Err(Bail);
            };

            if attrib_name == 0 && attrib_form == 0 {
                break;
            }

            if attrib_name > DW_AT_hi_user.0 as u64 {
                sink.error(Some(&wh), format_args!(": invalid name {attrib_name:#x}.\n"));
                flush_tables(&mut chain, &mut table);
                return Err(Bail);
            }
            if !attrib_form_valid(attrib_form) {
                sink.error(Some(&wh), format_args!(": invalid form {attrib_form:#x}.\n"));
                flush_tables(&mut chain, &mut table);
                return Err(Bail);
            }

            let name = DwAt(attrib_name as u16);
            let form = DwForm(attrib_form as u16);

            // The DIE walker checks sibling structure, so pin down the
            // assumptions it makes: at most one DW_AT_sibling, with a
            // CU-local reference form.
            if name == DW_AT_sibling {
                match sibling_attr {
                    Some(first) => sink.error(
                        Some(&wh),
                        format_args!(
                            ": Another DW_AT_sibling attribute in one abbreviation. \
                             (First was {first:#x}.)\n"
                        ),
                    ),
                    None => {
                        sibling_attr = Some(rel_off);
                        if !cur.has_children {
                            sink.message(
                                Cat::DIE_REL | Cat::BLOAT | Cat::IMPACT_1,
                                Some(&wh),
                                format_args!(
                                    ": Excessive DW_AT_sibling attribute at childless abbrev.\n"
                                ),
                            );
                        }
                    }
                }

                match check_sibling_form(form) {
                    SiblingForm::Ok => {}
                    SiblingForm::RefAddr => sink.message(
                        Cat::DIE_REL | Cat::IMPACT_2,
                        Some(&wh),
                        format_args!(
                            ": DW_AT_sibling attribute with form DW_FORM_ref_addr.\n"
                        ),
                    ),
                    SiblingForm::Bad => sink.error(
                        Some(&wh),
                        format_args!(
                            ": DW_AT_sibling attribute with non-reference form \"{form}\".\n"
                        ),
                    ),
                }
            } else if is_location_attrib(name) {
                if !location_form_valid(form) {
                    sink.error(
                        Some(&wh),
                        format_args!(": {name} with invalid form \"{form}\".\n"),
                    );
                }
            } else if name == DW_AT_ranges || name == DW_AT_stmt_list {
                if form != DW_FORM_data4 && form != DW_FORM_data8 && form != DW_FORM_indirect {
                    sink.error(
                        Some(&wh),
                        format_args!(": {name} with invalid form \"{form}\".\n"),
                    );
                }
                if name == DW_AT_ranges {
                    ranges = true;
                }
            } else if name == DW_AT_low_pc || name == DW_AT_high_pc {
                if form != DW_FORM_addr && form != DW_FORM_ref_addr {
                    sink.error(
                        Some(&wh),
                        format_args!(": {name} with invalid form \"{form}\".\n"),
                    );
                }
                if name == DW_AT_low_pc {
                    low_pc = true;
                } else {
                    high_pc = true;
                }
            }

            cur.attribs.push(AbbrevAttrib {
                name,
                form,
                wh: wh.clone(),
            });
        }

        wh.reset_2(abbr_off); // drop the attribute coordinate
        if high_pc && !low_pc {
            sink.error(
                Some(&wh),
                format_args!(": the abbrev has DW_AT_high_pc without also having DW_AT_low_pc.\n"),
            );
        } else if high_pc && ranges {
            sink.error(
                Some(&wh),
                format_args!(
                    ": the abbrev has DW_AT_high_pc & DW_AT_low_pc, but also has DW_AT_ranges.\n"
                ),
            );
        }

        // Keep the first definition when the code was a duplicate.
        if duplicate_of.is_none() {
            table.as_mut().expect("ensured above").abbrevs.push(cur);
        }
    }

    flush_tables(&mut chain, &mut table);
    for t in &mut chain.tables {
        // Most likely already sorted in the file, but don't rely on it.
        t.abbrevs.sort_by_key(|a| a.code);
    }

    Ok(chain)
}

fn flush_tables(chain: &mut AbbrevChain, table: &mut Option<AbbrevTable>) {
    if let Some(t) = table.take() {
        chain.tables.push(t);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object::Endianness;

    fn load_bytes(data: &[u8]) -> (Result<AbbrevChain, Bail>, Sink) {
        let mut sink = Sink::default();
        let mut ctx = ReadCtx::new(data, Endianness::Little);
        let chain = load(&mut ctx, &mut sink);
        (chain, sink)
    }

    // code 1: DW_TAG_compile_unit, children, name=DW_AT_name/string,
    // sibling/ref4; code 2: DW_TAG_base_type, no children, no attrs.
    const PLAIN: &[u8] = &[
        0x01, 0x11, 0x01, 0x03, 0x08, 0x01, 0x13, 0x00, 0x00, //
        0x02, 0x24, 0x00, 0x00, 0x00, //
        0x00,
    ];

    #[test]
    fn loads_tables() {
        let (chain, sink) = load_bytes(PLAIN);
        let chain = chain.unwrap();
        assert_eq!(sink.count, 0);
        assert_eq!(chain.tables.len(), 1);

        let table = chain.find_table(0).unwrap();
        assert_eq!(table.abbrevs.len(), 2);

        let cu = table.find(1).unwrap();
        assert_eq!(cu.tag, DW_TAG_compile_unit);
        assert!(cu.has_children);
        assert_eq!(cu.attribs.len(), 2);
        assert_eq!(cu.attribs[0].name, DW_AT_name);
        assert_eq!(cu.attribs[1].name, DW_AT_sibling);
        assert_eq!(cu.attribs[1].form, DW_FORM_ref4);

        let bt = table.find(2).unwrap();
        assert_eq!(bt.tag, DW_TAG_base_type);
        assert!(!bt.has_children);
        assert!(bt.attribs.is_empty());

        assert!(table.find(3).is_none());
    }

    #[test]
    fn second_table_after_terminator() {
        // Table at 0 with one entry; zero padding; table at 7.
        let data: &[u8] = &[
            0x01, 0x24, 0x00, 0x00, 0x00, // code 1, base_type
            0x00, 0x00, // padding run
            0x01, 0x24, 0x00, 0x00, 0x00, //
            0x00,
        ];
        let (chain, sink) = load_bytes(data);
        let chain = chain.unwrap();
        assert_eq!(chain.tables.len(), 2);
        assert!(chain.find_table(0).is_some());
        assert!(chain.find_table(7).is_some());
        // The second zero of the run is reported as padding.
        assert_eq!(sink.count, 1);
    }

    #[test]
    fn duplicate_code_keeps_first() {
        let data: &[u8] = &[
            0x01, 0x24, 0x00, 0x00, 0x00, // code 1, base_type
            0x01, 0x13, 0x00, 0x00, 0x00, // code 1 again, structure_type
            0x00,
        ];
        let (chain, sink) = load_bytes(data);
        let chain = chain.unwrap();
        assert_eq!(sink.count, 1);

        let table = chain.find_table(0).unwrap();
        assert_eq!(table.abbrevs.len(), 1);
        assert_eq!(table.find(1).unwrap().tag, DW_TAG_base_type);
    }

    #[test]
    fn bad_tag_bails() {
        // Tag 0x10000 > DW_TAG_hi_user.
        let data: &[u8] = &[0x01, 0x80, 0x80, 0x04, 0x01, 0x00, 0x00];
        let (chain, sink) = load_bytes(data);
        assert!(chain.is_err());
        assert!(sink.count > 0);
    }

    #[test]
    fn high_pc_without_low_pc() {
        // DW_AT_high_pc/addr alone.
        let data: &[u8] = &[0x01, 0x2e, 0x00, 0x12, 0x01, 0x00, 0x00, 0x00];
        let (chain, sink) = load_bytes(data);
        assert!(chain.is_ok());
        assert_eq!(sink.count, 1);
    }

    #[test]
    fn sibling_with_bad_form() {
        // DW_AT_sibling with DW_FORM_data4.
        let data: &[u8] = &[0x01, 0x11, 0x01, 0x01, 0x06, 0x00, 0x00, 0x00];
        let (_, sink) = load_bytes(data);
        assert_eq!(sink.count, 1);
    }
}
