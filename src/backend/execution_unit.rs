use crate::instructions::instructions::{Opcode, ValueType};

/// Computes the result of an arithmetic opcode on its resolved operands.
///
/// Returns `None` for opcodes that produce no arithmetic result: memory
/// operations get their value from the cache, branches are decided at commit.
/// Division by zero evaluates to zero.
pub(crate) fn evaluate(opcode: Opcode, vj: ValueType, vk: ValueType, immediate: i32) -> Option<ValueType> {
    let result = match opcode {
        Opcode::DADDI => vj + immediate as ValueType,
        Opcode::DSUBI => vj - immediate as ValueType,
        Opcode::ADD_D | Opcode::ADD_S => vj + vk,
        Opcode::SUB_D | Opcode::SUB_S => vj - vk,
        Opcode::MUL_D | Opcode::MUL_S => vj * vk,
        Opcode::DIV_D | Opcode::DIV_S => {
            if vk == 0.0 {
                0.0
            } else {
                vj / vk
            }
        }
        Opcode::LW | Opcode::LD | Opcode::L_S | Opcode::L_D |
        Opcode::SW | Opcode::SD | Opcode::S_S | Opcode::S_D |
        Opcode::BEQ | Opcode::BNE => return None,
    };

    if opcode.is_single() {
        return Some(result as f32 as ValueType);
    }
    Some(result)
}

pub(crate) fn branch_taken(opcode: Opcode, vj: ValueType, vk: ValueType) -> bool {
    match opcode {
        Opcode::BEQ => vj == vk,
        Opcode::BNE => vj != vk,
        _ => unreachable!("branch_taken called on non-branch opcode {}", opcode),
    }
}
