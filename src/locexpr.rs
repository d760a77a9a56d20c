// Copyright The dwarflint Authors
// SPDX-License-Identifier: Apache-2.0

//! Validation of DWARF location expressions.
//!
//! A location expression is a little stack-machine program embedded in
//! a block attribute or a `.debug_loc` entry. This walks the opcodes
//! with a static operand table, keeps the relocation cursor in step,
//! and cross-checks `DW_OP_bra`/`DW_OP_skip` branch targets against
//! the recorded opcode starts after the expression has been read.

#![allow(non_upper_case_globals)]

use crate::diag::{self, Cat, SecId, Sink, Where};
use crate::elf::ElfData;
use crate::readctx::ReadCtx;
use crate::records::{AddrRecord, RefRecord};
use crate::reloc::{relocate_one, RelTarget, RelocData, Skip};

use gimli::constants::*;

/// Unrecoverable parse failure; the containing chain cannot continue.
#[derive(Debug, thiserror::Error)]
#[error("location expression is unreadable")]
pub struct Bail;

/// Decode one attribute-form value.
///
/// Fixed-width forms read silently and let the caller report a read
/// failure; LEB128 forms report their own decoding problems. The value
/// of `DW_FORM_sdata` comes back bit-cast to `u64`.
pub fn read_form_value(
    ctx: &mut ReadCtx<'_>,
    sink: &mut Sink,
    addr_64: bool,
    form: DwForm,
    wh: &Where,
    what: &str,
) -> Option<u64> {
    match form {
        DW_FORM_addr => ctx.var(if addr_64 { 8 } else { 4 }).ok(),
        DW_FORM_udata => diag::checked_uleb128(ctx, sink, wh, what),
        DW_FORM_sdata => diag::checked_sleb128(ctx, sink, wh, what).map(|v| v as u64),
        DW_FORM_data1 => ctx.u8().ok().map(u64::from),
        DW_FORM_data2 => ctx.u16().ok().map(u64::from),
        DW_FORM_data4 => ctx.u32().ok().map(u64::from),
        DW_FORM_data8 => ctx.u64().ok(),
        _ => None,
    }
}

/// Operand forms of a location-expression opcode, `None` when the
/// opcode takes fewer than two operands.
fn operands(op: DwOp) -> Option<(Option<DwForm>, Option<DwForm>)> {
    let none = (None, None);
    Some(match op {
        DW_OP_addr => (Some(DW_FORM_addr), None),
        DW_OP_call_ref => (Some(DW_FORM_addr), None),

        DW_OP_const1u | DW_OP_const1s | DW_OP_pick | DW_OP_deref_size | DW_OP_xderef_size => {
            (Some(DW_FORM_data1), None)
        }

        DW_OP_const2u | DW_OP_const2s | DW_OP_bra | DW_OP_skip | DW_OP_call2 => {
            (Some(DW_FORM_data2), None)
        }

        DW_OP_const4u | DW_OP_const4s | DW_OP_call4 => (Some(DW_FORM_data4), None),
        DW_OP_const8u | DW_OP_const8s => (Some(DW_FORM_data8), None),

        DW_OP_constu | DW_OP_plus_uconst | DW_OP_regx | DW_OP_piece => {
            (Some(DW_FORM_udata), None)
        }
        DW_OP_consts | DW_OP_fbreg => (Some(DW_FORM_sdata), None),

        DW_OP_bregx => (Some(DW_FORM_udata), Some(DW_FORM_sdata)),
        DW_OP_bit_piece => (Some(DW_FORM_udata), Some(DW_FORM_udata)),

        DW_OP_deref | DW_OP_dup | DW_OP_drop | DW_OP_over | DW_OP_swap | DW_OP_rot
        | DW_OP_xderef | DW_OP_abs | DW_OP_and | DW_OP_div | DW_OP_minus | DW_OP_mod
        | DW_OP_mul | DW_OP_neg | DW_OP_not | DW_OP_or | DW_OP_plus | DW_OP_shl | DW_OP_shr
        | DW_OP_shra | DW_OP_xor | DW_OP_eq | DW_OP_ge | DW_OP_gt | DW_OP_le | DW_OP_lt
        | DW_OP_ne | DW_OP_nop | DW_OP_push_object_address | DW_OP_form_tls_address
        | DW_OP_call_frame_cfa => none,

        op if (DW_OP_lit0.0..=DW_OP_lit31.0).contains(&op.0) => none,
        op if (DW_OP_reg0.0..=DW_OP_reg31.0).contains(&op.0) => none,
        op if (DW_OP_breg0.0..=DW_OP_breg31.0).contains(&op.0) => (Some(DW_FORM_sdata), None),

        _ => return None,
    })
}

/// Section class a relocated operand of `op` must target.
fn reloc_target_loc(op: DwOp) -> RelTarget {
    match op {
        DW_OP_call2 | DW_OP_call4 => RelTarget::Sec(SecId::Info),
        DW_OP_addr => RelTarget::Address,
        _ => RelTarget::Value,
    }
}

/// Validate one location expression of `length` bytes starting at the
/// cursor of `parent_ctx`. `init_off` is the section offset of the
/// expression start, used for breadcrumbs and branch targets.
///
/// The parent cursor is not advanced; the caller skips the block.
#[allow(clippy::too_many_arguments)]
pub fn check_location_expression(
    file: &ElfData<'_>,
    parent_ctx: &ReadCtx<'_>,
    init_off: u64,
    reloc: Option<&mut RelocData>,
    length: u64,
    wh: &Where,
    addr_64: bool,
    sink: &mut Sink,
) -> Result<(), Bail> {
    let begin = parent_ctx.pos();
    let Ok(mut ctx) = usize::try_from(length)
        .ok()
        .and_then(|len| begin.checked_add(len))
        .ok_or(())
        .and_then(|end| parent_ctx.sub(begin, end).map_err(|_| ()))
    else {
        sink.error(Some(wh), format_args!(": not enough data for location expression.\n"));
        return Err(Bail);
    };

    let mut reloc = reloc;
    let mut opaddrs = AddrRecord::default();
    let mut oprefs = RefRecord::default();

    'expr: while !ctx.eof() {
        let opcode_off = ctx.offset() + init_off;
        let mut owh = Where::new_ref(SecId::Locexpr, wh);
        owh.reset_1(opcode_off);
        opaddrs.add(opcode_off);

        let Ok(opcode) = ctx.u8() else {
            sink.error(Some(&owh), format_args!(": can't read opcode.\n"));
            break;
        };
        let opcode = DwOp(opcode);

        let Some((op1, op2)) = operands(opcode) else {
            sink.error(
                Some(&owh),
                format_args!(": can't decode opcode \"{opcode}\".\n"),
            );
            break;
        };

        let mut values = [0u64; 2];
        for (i, op) in [op1, op2].into_iter().enumerate() {
            let Some(form) = op else {
                continue;
            };
            let off = ctx.offset() + init_off;
            let nth = ["1st", "2nd"][i];
            let what = format!("{nth} operand");
            match read_form_value(&mut ctx, sink, addr_64, form, &owh, &what) {
                Some(v) => values[i] = v,
                None => {
                    sink.error(
                        Some(&owh),
                        format_args!(
                            ": opcode \"{opcode}\": can't read {nth} operand (form \"{form}\").\n"
                        ),
                    );
                    break 'expr;
                }
            }

            let rel = match reloc.as_deref_mut() {
                Some(r) => r.next(off, &owh, Skip::Mismatched, sink),
                None => None,
            };
            if let (Some(rel), Some(r)) = (rel, reloc.as_deref_mut()) {
                relocate_one(
                    file,
                    r,
                    &rel,
                    if addr_64 { 8 } else { 4 },
                    &mut values[i],
                    &owh,
                    reloc_target_loc(opcode),
                    sink,
                );
            }
        }

        match opcode {
            DW_OP_bra | DW_OP_skip => {
                let skip = values[0] as u16 as i16;
                if skip == 0 {
                    sink.message(
                        Cat::LOC | Cat::BLOAT | Cat::IMPACT_3,
                        Some(&owh),
                        format_args!(": {opcode} with skip 0.\n"),
                    );
                } else if skip > 0 && !ctx.need_data(skip as u64) {
                    sink.error(
                        Some(&owh),
                        format_args!(": {opcode} branches out of location expression.\n"),
                    );
                } else if skip < 0 && u64::from(skip.unsigned_abs()) > ctx.offset() {
                    sink.error(
                        Some(&owh),
                        format_args!(
                            ": {opcode} branches before the beginning of location expression.\n"
                        ),
                    );
                } else {
                    oprefs.add(opcode_off.wrapping_add_signed(skip.into()), &owh);
                }
            }

            DW_OP_const8u | DW_OP_const8s if !addr_64 => {
                sink.error(Some(&owh), format_args!(": {opcode} on 32-bit machine.\n"));
            }

            DW_OP_constu | DW_OP_consts | DW_OP_deref_size | DW_OP_plus_uconst
                if !addr_64 && values[0] > u32::MAX as u64 =>
            {
                sink.message(
                    Cat::LOC | Cat::BLOAT | Cat::IMPACT_3,
                    Some(&owh),
                    format_args!(
                        ": {opcode} with operand {:#x} on 32-bit machine.\n",
                        values[0]
                    ),
                );
            }

            _ => {}
        }
    }

    for r in &oprefs {
        if !opaddrs.contains(r.addr) {
            sink.error(
                Some(&r.who),
                format_args!(": unresolved reference to opcode at {:#x}.\n", r.addr),
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use object::Endianness;

    fn check(expr: &[u8], addr_64: bool) -> u64 {
        let mut sink = Sink::default();
        let ctx = ReadCtx::new(expr, Endianness::Little);
        // Sectionless ELF: exercise the expression machinery only.
        let image = crate::tests::minimal_elf64();
        let file = crate::elf::parse_bytes(&image, &mut sink).unwrap();
        check_location_expression(
            &file,
            &ctx,
            0,
            None,
            expr.len() as u64,
            &Where::new(SecId::Loc),
            addr_64,
            &mut sink,
        )
        .unwrap();
        sink.count
    }

    #[test]
    fn plain_expression() {
        // DW_OP_breg6 -8; DW_OP_lit0; DW_OP_plus
        assert_eq!(check(&[0x76, 0x78, 0x30, 0x22], false), 0);
    }

    #[test]
    fn skip_zero_is_bloat() {
        assert_eq!(check(&[0x2f, 0x00, 0x00], false), 1);
    }

    #[test]
    fn skip_out_of_bounds() {
        // DW_OP_skip +16 runs past the end.
        assert_eq!(check(&[0x2f, 0x10, 0x00], false), 1);
    }

    #[test]
    fn skip_before_start() {
        // DW_OP_nop, then DW_OP_skip -32.
        assert_eq!(check(&[0x96, 0x2f, 0xe0, 0xff], false), 1);
    }

    #[test]
    fn branch_to_opcode_start() {
        // DW_OP_skip +3 from offset 0 lands on the opcode at offset 3.
        // (Branch targets are measured from the opcode byte.)
        assert_eq!(check(&[0x2f, 0x03, 0x00, 0x96, 0x96, 0x96], false), 0);
    }

    #[test]
    fn branch_mid_opcode() {
        // DW_OP_skip +4 from offset 0 lands mid-stream at 4, inside
        // the DW_OP_const1u operand.
        assert_eq!(check(&[0x2f, 0x04, 0x00, 0x10, 0x05, 0x96, 0x96], false), 1);
    }

    #[test]
    fn const8_needs_64bit() {
        let expr = [0x0e, 1, 2, 3, 4, 5, 6, 7, 8]; // DW_OP_const8u
        assert_eq!(check(&expr, false), 1);
        assert_eq!(check(&expr, true), 0);
    }

    #[test]
    fn wide_constu_on_32bit() {
        // DW_OP_constu 0x1_0000_0000
        let expr = [0x10, 0x80, 0x80, 0x80, 0x80, 0x10];
        assert_eq!(check(&expr, false), 1);
        assert_eq!(check(&expr, true), 0);
    }

    #[test]
    fn unknown_opcode() {
        assert_eq!(check(&[0x02], false), 1); // reserved opcode
    }
}
