// Copyright The dwarflint Authors
// SPDX-License-Identifier: Apache-2.0

//! Diagnostic classification and reporting.
//!
//! Every finding is tagged with a [`Cat`] bitmask describing which axes
//! it touches (section, aspect, accuracy, impact). Two [`Criteria`] in
//! disjunctive normal form — one for warnings, one for errors — decide
//! whether a finding is suppressed, printed as a warning, or promoted
//! to an error. The algebra on criteria (OR, AND, NOT, product) is what
//! the CLI flags are compiled into.

use crate::readctx::ReadCtx;
use std::fmt;

/// Category bitmask for one diagnostic.
///
/// Categories combine with `|`. A category is a conjunction of the
/// named predicates whose bits are set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cat(u32);

macro_rules! categories {
    ( $( $name:ident = $bit:expr ; )* ) => {
        impl Cat {
            /// The empty category; asserts nothing.
            pub const NONE: Cat = Cat(0);
            $( #[allow(missing_docs)] pub const $name: Cat = Cat(1 << $bit); )*

            /// Names of all category bits, index = bit position.
            const NAMES: &'static [&'static str] = &[ $( stringify!($name), )* ];
        }
    };
}

categories! {
    INFO = 0;
    ABBREVS = 1;
    ARANGES = 2;
    LINE = 3;
    LOC = 4;
    RANGES = 5;
    STRINGS = 6;
    PUBTABLES = 7;
    PUBNAMES = 8;
    PUBTYPES = 9;
    ELF = 10;
    RELOC = 11;
    HEADER = 12;
    DIE_REL = 13;
    DIE_OTHER = 14;
    BLOAT = 15;
    SUBOPTIMAL = 16;
    IMPACT_1 = 17;
    IMPACT_2 = 18;
    IMPACT_3 = 19;
    IMPACT_4 = 20;
    ERROR = 21;
    LEB128 = 22;
}

impl Cat {
    /// True when every bit of `other` is set in `self`.
    pub fn contains(self, other: Cat) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when `self` and `other` share at least one bit.
    pub fn intersects(self, other: Cat) -> bool {
        self.0 & other.0 != 0
    }

    /// True when no bit is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    fn bits(self) -> impl Iterator<Item = usize> {
        (0..Self::NAMES.len()).filter(move |i| self.0 & (1 << i) != 0)
    }
}

impl std::ops::BitOr for Cat {
    type Output = Cat;
    fn bitor(self, rhs: Cat) -> Cat {
        Cat(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for Cat {
    fn bitor_assign(&mut self, rhs: Cat) {
        self.0 |= rhs.0;
    }
}

/// One conjunction of a DNF criterion: positive and negated predicates.
///
/// A term like `A & B & !C` is stored as `pos = A|B`, `neg = C`.
/// Invariant: `pos` and `neg` are disjoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Term {
    /// Predicates that must all be present.
    pub pos: Cat,
    /// Predicates that must all be absent.
    pub neg: Cat,
}

impl Term {
    /// Term accepting exactly the categories that contain `pos`.
    pub fn requires(pos: Cat) -> Term {
        Term {
            pos,
            neg: Cat::NONE,
        }
    }

    /// Term accepting exactly the categories disjoint from `neg`.
    pub fn rejects(neg: Cat) -> Term {
        Term {
            pos: Cat::NONE,
            neg,
        }
    }

    fn contradictory(&self) -> bool {
        self.pos.intersects(self.neg)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        let mut got = false;
        for (i, name) in Cat::NAMES.iter().enumerate() {
            let mask = Cat(1 << i);
            if !self.pos.intersects(mask) && !self.neg.intersects(mask) {
                continue;
            }
            if got {
                write!(f, " & ")?;
            }
            if self.neg.intersects(mask) {
                write!(f, "~")?;
            }
            write!(f, "{}", name.to_lowercase())?;
            got = true;
        }
        if !got {
            write!(f, "1")?;
        }
        write!(f, ")")
    }
}

/// Acceptance criterion in disjunctive normal form: a sum of [`Term`]s.
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    terms: Vec<Term>,
}

impl Criteria {
    /// The empty sum, which accepts nothing.
    pub fn empty() -> Criteria {
        Criteria::default()
    }

    /// True when some term matches `cat`.
    pub fn accept(&self, cat: Cat) -> bool {
        self.terms
            .iter()
            .any(|t| cat.contains(t.pos) && !cat.intersects(t.neg))
    }

    /// OR in another term.
    pub fn or(&mut self, term: Term) {
        debug_assert!(!term.contradictory());
        self.terms.push(term);
    }

    /// AND every term with `term`, dropping terms that become
    /// contradictory (`A & ~A`).
    pub fn and(&mut self, term: Term) {
        debug_assert!(!term.contradictory());
        self.terms.retain_mut(|t| {
            t.pos |= term.pos;
            t.neg |= term.neg;
            !t.contradictory()
        });
    }

    /// Negate one term: `!(a & b & ~c)` becomes `~a + ~b + c`.
    pub fn negate(term: Term) -> Criteria {
        debug_assert!(!term.contradictory());
        let mut ret = Criteria::empty();
        for i in term.pos.bits() {
            ret.or(Term::rejects(Cat(1 << i)));
        }
        for i in term.neg.bits() {
            ret.or(Term::requires(Cat(1 << i)));
        }
        ret
    }

    /// Multiply with `rhs`: the Cartesian product of term pairs, each
    /// pair combined pointwise and dropped when contradictory.
    pub fn mul(&mut self, rhs: &Criteria) {
        let mut ret = Criteria::empty();
        for a in &self.terms {
            for b in &rhs.terms {
                let t = Term {
                    pos: a.pos | b.pos,
                    neg: a.neg | b.neg,
                };
                if !t.contradictory() {
                    ret.or(t);
                }
            }
        }
        *self = ret;
    }

    /// Reject every category that `term` matches: multiply with the
    /// negation of `term`.
    pub fn and_not(&mut self, term: Term) {
        let neg = Criteria::negate(Term {
            pos: term.neg,
            neg: term.pos,
        });
        self.mul(&neg);
    }
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, t) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{t}")?;
        }
        Ok(())
    }
}

/// Identifies the section (or pseudo-section) a diagnostic points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum SecId {
    Info,
    Abbrev,
    Aranges,
    Pubnames,
    Pubtypes,
    Str,
    Line,
    Loc,
    Mac,
    Ranges,
    Locexpr,
    Rel,
    Rela,
}

/// Per-section formatting: section name plus the label and numeric
/// style of up to three coordinates.
struct SecFmt {
    name: &'static str,
    coords: [Option<(&'static str, NumStyle)>; 3],
}

#[derive(Clone, Copy)]
enum NumStyle {
    Dec,
    Hex,
}

impl SecId {
    /// The section name as it appears in the ELF file.
    pub fn name(self) -> &'static str {
        self.formatting().name
    }

    fn formatting(self) -> SecFmt {
        use NumStyle::*;
        let (name, c1, c2, c3) = match self {
            SecId::Info => (".debug_info", Some(("CU", Dec)), Some(("DIE", Hex)), None),
            SecId::Abbrev => (
                ".debug_abbrev",
                Some(("section", Dec)),
                Some(("abbreviation", Dec)),
                Some(("abbr. attribute", Hex)),
            ),
            SecId::Aranges => (
                ".debug_aranges",
                Some(("table", Dec)),
                Some(("arange", Hex)),
                None,
            ),
            SecId::Pubnames => (
                ".debug_pubnames",
                Some(("pubname table", Dec)),
                Some(("pubname", Hex)),
                None,
            ),
            SecId::Pubtypes => (
                ".debug_pubtypes",
                Some(("pubtype table", Dec)),
                Some(("pubtype", Hex)),
                None,
            ),
            SecId::Str => (".debug_str", Some(("offset", Hex)), None, None),
            SecId::Line => (
                ".debug_line",
                Some(("table", Dec)),
                Some(("offset", Hex)),
                None,
            ),
            SecId::Loc => (
                ".debug_loc",
                Some(("loclist", Hex)),
                Some(("offset", Hex)),
                None,
            ),
            SecId::Mac => (".debug_mac", None, None, None),
            SecId::Ranges => (
                ".debug_ranges",
                Some(("rangelist", Hex)),
                Some(("offset", Hex)),
                None,
            ),
            SecId::Locexpr => ("location expression", Some(("offset", Hex)), None, None),
            SecId::Rel => (".rel", Some(("relocation", Dec)), Some(("offset", Hex)), None),
            SecId::Rela => (
                ".rela",
                Some(("relocation", Dec)),
                Some(("offset", Hex)),
                None,
            ),
        };
        SecFmt {
            name,
            coords: [c1, c2, c3],
        }
    }
}

/// Breadcrumb locating a diagnostic.
///
/// Up to three coordinates whose meaning depends on the section, an
/// optional reference breadcrumb (the location that caused us to look
/// here), and an optional `next` chain printed under `--ref`.
#[derive(Debug, Clone, PartialEq)]
pub struct Where {
    /// Section the breadcrumb points into.
    pub sec: SecId,
    addrs: [Option<u64>; 3],
    /// Whether the first coordinate names a whole CU DIE rather than
    /// a plain coordinate.
    pub cudie: bool,
    /// The breadcrumb that caused this location to be inspected.
    pub reference: Option<Box<Where>>,
    /// Chain of further referrers, reported under `--ref`.
    pub next: Option<Box<Where>>,
}

impl Where {
    /// A breadcrumb with no coordinates set.
    pub fn new(sec: SecId) -> Where {
        Where {
            sec,
            addrs: [None; 3],
            cudie: false,
            reference: None,
            next: None,
        }
    }

    /// A breadcrumb caused by `reference`.
    pub fn new_ref(sec: SecId, reference: &Where) -> Where {
        let mut wh = Where::new(sec);
        wh.reference = Some(Box::new(reference.clone()));
        wh
    }

    /// Set the first coordinate, clearing the deeper ones.
    pub fn reset_1(&mut self, addr: u64) -> &mut Where {
        self.addrs = [Some(addr), None, None];
        self
    }

    /// Set the second coordinate, clearing the third.
    pub fn reset_2(&mut self, addr: u64) -> &mut Where {
        self.addrs[1] = Some(addr);
        self.addrs[2] = None;
        self
    }

    /// Set the third coordinate.
    pub fn reset_3(&mut self, addr: u64) -> &mut Where {
        self.addrs[2] = Some(addr);
        self
    }

    /// Retrieve the first coordinate, if set.
    pub fn addr1(&self) -> Option<u64> {
        self.addrs[0]
    }

    /// Breadcrumb naming a whole CU DIE in `.debug_info`.
    pub fn cu_die(offset: u64) -> Where {
        let mut wh = Where::new(SecId::Info);
        wh.reset_1(offset);
        wh.cudie = true;
        wh
    }

    fn fmt_inner(&self, f: &mut fmt::Formatter<'_>, toplevel: bool) -> fmt::Result {
        let info = self.sec.formatting();
        let is_reloc = matches!(self.sec, SecId::Rel | SecId::Rela);

        if toplevel {
            write!(f, "{}", info.name)?;
            if is_reloc {
                // Relocation breadcrumbs name the relocated section:
                // ".rela.debug_info". Location expressions are skipped
                // over, the interesting section is behind them.
                let mut refd = self.reference.as_deref();
                while let Some(r) = refd {
                    if r.sec == SecId::Locexpr {
                        refd = r.reference.as_deref();
                    } else {
                        break;
                    }
                }
                if let Some(r) = refd {
                    write!(f, "{}", r.sec.formatting().name)?;
                }
            }
            if self.addrs[0].is_some() {
                write!(f, ": ")?;
            }
        }

        if self.cudie {
            if let Some(addr) = self.addrs[0] {
                write!(f, "CU DIE {addr}")?;
            }
        } else {
            let mut got = false;
            for (addr, coord) in self.addrs.iter().zip(info.coords.iter()) {
                let (Some(addr), Some((label, style))) = (addr, coord) else {
                    break;
                };
                if got {
                    write!(f, ": ")?;
                }
                match style {
                    NumStyle::Dec => write!(f, "{label} {addr}")?,
                    NumStyle::Hex => write!(f, "{label} {addr:#x}")?,
                }
                got = true;
            }
        }

        if !is_reloc {
            if let Some(r) = &self.reference {
                write!(f, " (")?;
                r.fmt_inner(f, false)?;
                write!(f, ")")?;
            }
        }

        Ok(())
    }
}

impl fmt::Display for Where {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_inner(f, true)
    }
}

/// Collects and classifies diagnostics for one run.
///
/// This is the only mutable state threaded through the checkers: the
/// criteria are fixed after CLI parsing, the counter accumulates.
#[derive(Debug, Clone)]
pub struct Sink {
    /// Messages accepted by these criteria are printed.
    pub warn_criteria: Criteria,
    /// Accepted messages also matching these criteria become errors.
    pub error_criteria: Criteria,
    /// Print `caused by this reference` chains.
    pub show_refs: bool,
    /// Count of printed diagnostics (warnings included, so that test
    /// baselines stay stable).
    pub count: u64,
    /// Count of diagnostics printed with error severity. This is what
    /// decides the process exit code.
    pub error_count: u64,
}

impl Default for Sink {
    fn default() -> Sink {
        // Accept-everything warnings; errors for ERROR or IMPACT_4.
        let mut warn = Criteria::empty();
        warn.or(Term::requires(Cat::NONE));

        let mut error = Criteria::empty();
        error.or(Term::requires(Cat::IMPACT_4));
        error.or(Term::requires(Cat::ERROR));

        Sink {
            warn_criteria: warn,
            error_criteria: error,
            show_refs: false,
            count: 0,
            error_count: 0,
        }
    }
}

impl Sink {
    fn emit(&mut self, severity: &str, wh: Option<&Where>, msg: fmt::Arguments<'_>) {
        match wh {
            Some(wh) => print!("{severity}: {wh}{msg}"),
            None => print!("{severity}: {msg}"),
        }
        if self.show_refs {
            if let Some(wh) = wh {
                let mut it = wh.next.as_deref();
                while let Some(w) = it {
                    println!("{severity}: {w}: caused by this reference.");
                    it = w.next.as_deref();
                }
            }
        }
        self.count += 1;
    }

    /// Report an unconditional error.
    pub fn error(&mut self, wh: Option<&Where>, msg: fmt::Arguments<'_>) {
        self.emit("error", wh, msg);
        self.error_count += 1;
    }

    /// Report an unconditional warning.
    pub fn warning(&mut self, wh: Option<&Where>, msg: fmt::Arguments<'_>) {
        self.emit("warning", wh, msg);
    }

    /// Report a categorized message, subject to the criteria.
    pub fn message(&mut self, cat: Cat, wh: Option<&Where>, msg: fmt::Arguments<'_>) {
        if self.warn_criteria.accept(cat) {
            if self.error_criteria.accept(cat) {
                self.error(wh, msg);
            } else {
                self.warning(wh, msg);
            }
        }
    }

    /// Whether messages of this category would be printed at all.
    ///
    /// Used to skip building expensive inputs (e.g. string coverage)
    /// whose findings would be suppressed anyway.
    pub fn accepts(&self, cat: Cat) -> bool {
        self.warn_criteria.accept(cat)
    }

    /// Report a range of unnecessary zero padding.
    pub fn padding_0(&mut self, cat: Cat, wh: &Where, start: u64, end: u64) {
        self.message(
            cat | Cat::BLOAT | Cat::IMPACT_1,
            Some(wh),
            format_args!(": [{start:#x}, {end:#x}): unnecessary padding with zero bytes.\n"),
        );
    }

    /// Report a range of unreferenced non-zero bytes.
    pub fn padding_n0(&mut self, cat: Cat, wh: &Where, start: u64, end: u64) {
        self.message(
            cat | Cat::BLOAT | Cat::IMPACT_1,
            Some(wh),
            format_args!(": [{start:#x}, {end:#x}): unreferenced non-zero bytes.\n"),
        );
    }

    /// Report a LEB128 quantity encoded in more bytes than necessary.
    pub fn leb128_bloat(&mut self, wh: &Where, what: &str, value: &str, raw: &[u8]) {
        let enc: String = raw.iter().map(|b| format!(" {b:02x}")).collect();
        self.message(
            Cat::LEB128 | Cat::BLOAT | Cat::IMPACT_3,
            Some(wh),
            format_args!(": {what}: value {value} encoded as `{}'.\n", enc.trim_start()),
        );
    }
}

/// Report one uncovered gap of a section.
///
/// All-zero gaps that look like deliberate alignment padding are
/// accepted silently; everything else is flagged as zero padding or
/// as unreferenced non-zero bytes.
#[allow(clippy::too_many_arguments)]
pub fn report_hole(
    start: u64,
    length: u64,
    data: &[u8],
    align: u64,
    cat: Cat,
    wh: &Where,
    sink: &mut Sink,
) {
    let end = start + length;
    let all_zeroes = data[start as usize..end as usize].iter().all(|&b| b == 0);

    if all_zeroes {
        // Zero padding is valid if it aligns on the bounds of `align`
        // bytes and is not excessive.
        if !(align > 1 && end % align == 0 && start % 4 != 0 && length < align) {
            sink.padding_0(cat, wh, start, end);
        }
    } else {
        // This reads slightly wrong when the gap mixes zero and
        // non-zero runs, but sub-classifying those is not worth it.
        sink.padding_n0(cat, wh, start, end);
    }
}

/// Resolve a DWARF initial length: the 32-bit value already read, plus
/// the 64-bit escape. Returns the length and whether the unit uses the
/// 64-bit DWARF format.
pub fn read_initial_length(
    ctx: &mut ReadCtx<'_>,
    size32: u32,
    sink: &mut Sink,
    wh: &Where,
) -> Option<(u64, bool)> {
    use crate::readctx::{DWARF_LENGTH_64_BIT, DWARF_LENGTH_MIN_ESCAPE};

    if size32 == DWARF_LENGTH_64_BIT {
        match ctx.u64() {
            Ok(size) => Some((size, true)),
            Err(_) => {
                sink.error(Some(wh), format_args!(": can't read 64bit CU length.\n"));
                None
            }
        }
    } else if size32 >= DWARF_LENGTH_MIN_ESCAPE {
        sink.error(
            Some(wh),
            format_args!(": unrecognized CU length escape value: {size32:#x}.\n"),
        );
        None
    } else {
        Some((size32 as u64, false))
    }
}

/// Check a version field against the versions a table supports.
pub fn supported_version(version: u16, supported: &[u16], wh: &Where, sink: &mut Sink) -> bool {
    if supported.contains(&version) {
        true
    } else {
        sink.error(Some(wh), format_args!(": unsupported version {version}.\n"));
        false
    }
}

/// If everything from the cursor to the end of the context is zero,
/// report it as padding, consume it, and return true. Otherwise leave
/// the cursor untouched.
pub fn check_zero_padding(ctx: &mut ReadCtx<'_>, cat: Cat, wh: &Where, sink: &mut Sink) -> bool {
    let start = ctx.pos();
    let rest = ctx.slice(start, ctx.end());
    if rest.is_empty() {
        return true;
    }
    if rest.iter().any(|&b| b != 0) {
        return false;
    }
    let begin = ctx.offset();
    let end = begin + rest.len() as u64;
    ctx.skip(rest.len() as u64).expect("sized above");
    sink.padding_0(cat, wh, begin, end);
    true
}

/// Read a ULEB128, reporting unreadable values as errors and bloated
/// encodings as suppressible messages.
pub fn checked_uleb128(
    ctx: &mut ReadCtx<'_>,
    sink: &mut Sink,
    wh: &Where,
    what: &str,
) -> Option<u64> {
    let start = ctx.pos();
    match ctx.uleb128() {
        Err(_) => {
            sink.error(Some(wh), format_args!(": can't read {what}.\n"));
            None
        }
        Ok((value, bloated)) => {
            if bloated {
                let raw = ctx.slice(start, ctx.pos());
                sink.leb128_bloat(wh, what, &format!("{value:#x}"), raw);
            }
            Some(value)
        }
    }
}

/// Like [`checked_uleb128`], for signed quantities.
pub fn checked_sleb128(
    ctx: &mut ReadCtx<'_>,
    sink: &mut Sink,
    wh: &Where,
    what: &str,
) -> Option<i64> {
    let start = ctx.pos();
    match ctx.sleb128() {
        Err(_) => {
            sink.error(Some(wh), format_args!(": can't read {what}.\n"));
            None
        }
        Ok((value, bloated)) => {
            if bloated {
                let raw = ctx.slice(start, ctx.pos());
                let repr = if value < 0 {
                    format!("-{:#x}", value.unsigned_abs())
                } else {
                    format!("{value:#x}")
                };
                sink.leb128_bloat(wh, what, &repr, raw);
            }
            Some(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_logic() {
        let mut cri = Criteria::empty();
        assert!(!cri.accept(Cat::LOC));

        cri.or(Term::requires(Cat::NONE));
        assert!(cri.accept(Cat::NONE));
        assert!(cri.accept(Cat::LOC | Cat::IMPACT_3));

        cri.and(Term::rejects(Cat::LOC));
        assert!(cri.accept(Cat::RANGES));
        assert!(!cri.accept(Cat::LOC | Cat::IMPACT_3));
    }

    #[test]
    fn terms_stay_disjoint() {
        let mut cri = Criteria::empty();
        cri.or(Term::requires(Cat::LINE | Cat::HEADER));
        cri.or(Term::requires(Cat::ERROR));

        // ANDing with ~line keeps only the error term alive.
        cri.and(Term::rejects(Cat::LINE));
        assert!(!cri.accept(Cat::LINE | Cat::HEADER));
        assert!(cri.accept(Cat::ERROR));
    }

    #[test]
    fn negation() {
        // !(line & header & ~bloat) == ~line + ~header + bloat
        let neg = Criteria::negate(Term {
            pos: Cat::LINE | Cat::HEADER,
            neg: Cat::BLOAT,
        });
        assert!(neg.accept(Cat::NONE)); // lacks line
        assert!(neg.accept(Cat::LINE)); // lacks header
        assert!(neg.accept(Cat::LINE | Cat::HEADER | Cat::BLOAT));
        assert!(!neg.accept(Cat::LINE | Cat::HEADER));
    }

    #[test]
    fn and_not() {
        // Default warnings minus (line & header & bloat), the --strict
        // complement used by the CLI.
        let mut cri = Criteria::empty();
        cri.or(Term::requires(Cat::NONE));
        cri.and_not(Term::requires(Cat::LINE | Cat::HEADER | Cat::BLOAT));

        assert!(cri.accept(Cat::LINE | Cat::HEADER));
        assert!(cri.accept(Cat::LINE | Cat::BLOAT));
        assert!(!cri.accept(Cat::LINE | Cat::HEADER | Cat::BLOAT));
        assert!(!cri.accept(Cat::LINE | Cat::HEADER | Cat::BLOAT | Cat::IMPACT_2));
    }

    #[test]
    fn where_formatting() {
        let mut wh = Where::new(SecId::Info);
        wh.reset_1(3);
        wh.reset_2(0x1a);
        assert_eq!(wh.to_string(), ".debug_info: CU 3: DIE 0x1a");

        let mut outer = Where::new_ref(SecId::Loc, &wh);
        outer.reset_1(0x30);
        assert_eq!(
            outer.to_string(),
            ".debug_loc: loclist 0x30 (CU 3: DIE 0x1a)"
        );

        let plain = Where::new(SecId::Aranges);
        assert_eq!(plain.to_string(), ".debug_aranges");
    }

    #[test]
    fn where_reloc_names_target_section() {
        let die = Where::new(SecId::Info);
        let mut rel = Where::new_ref(SecId::Rela, &die);
        rel.reset_1(7);
        assert_eq!(rel.to_string(), ".rela.debug_info: relocation 7");
    }
}

