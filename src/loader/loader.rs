use std::fs;

use regex::Regex;
use thiserror::Error;

use crate::instructions::instructions::{get_opcode, get_register, Instr, Opcode, Reg};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("{0}")]
    ParseError(String),
    #[error("{0}")]
    UnsupportedOpcode(String),
    #[error("{0}")]
    IOError(String),
}

struct Loader {
    line_pattern: Regex,
    memory_operand_pattern: Regex,
    code: Vec<Instr>,
}

impl Loader {
    fn new() -> Result<Loader, LoadError> {
        let compile = |pattern: &str| Regex::new(pattern).map_err(|err| LoadError::ParseError(err.to_string()));
        Ok(Loader {
            line_pattern: compile(r"^([A-Za-z][A-Za-z.]*)(?:\s+(.*))?$")?,
            memory_operand_pattern: compile(r"^(#?-?\d+)\(\s*(\w+)\s*\)$")?,
            code: Vec::new(),
        })
    }

    fn load(&mut self, input: &str) -> Result<(), LoadError> {
        for (index, raw_line) in input.lines().enumerate() {
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }
            let instr = self.parse_instr(line, index + 1)?;
            self.code.push(instr);
        }
        Ok(())
    }

    fn parse_instr(&self, line: &str, line_no: usize) -> Result<Instr, LoadError> {
        let captures = self.line_pattern.captures(line).ok_or_else(|| {
            LoadError::ParseError(format!("Malformed instruction '{}' at line {}", line, line_no))
        })?;

        let mnemonic = captures.get(1).map_or("", |m| m.as_str());
        let opcode = get_opcode(mnemonic).ok_or_else(|| {
            LoadError::UnsupportedOpcode(format!("Unsupported opcode '{}' at line {}", mnemonic, line_no))
        })?;

        let operands: Vec<&str> = captures.get(2)
            .map_or("", |m| m.as_str())
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .collect();

        let expect_count = |count: usize| -> Result<(), LoadError> {
            if operands.len() != count {
                return Err(LoadError::ParseError(format!("{} expects {} operands, but {} are provided at line {}",
                                                         opcode, count, operands.len(), line_no)));
            }
            Ok(())
        };

        let instr = match opcode {
            Opcode::ADD_D | Opcode::ADD_S |
            Opcode::SUB_D | Opcode::SUB_S |
            Opcode::MUL_D | Opcode::MUL_S |
            Opcode::DIV_D | Opcode::DIV_S => {
                expect_count(3)?;
                Instr::arith(opcode,
                             self.parse_register(operands[0], line_no)?,
                             self.parse_register(operands[1], line_no)?,
                             self.parse_register(operands[2], line_no)?)
            }
            Opcode::DADDI | Opcode::DSUBI => {
                expect_count(3)?;
                Instr::immediate(opcode,
                                 self.parse_register(operands[0], line_no)?,
                                 self.parse_register(operands[1], line_no)?,
                                 self.parse_immediate(operands[2], line_no)?)
            }
            Opcode::LW | Opcode::LD | Opcode::L_S | Opcode::L_D => {
                expect_count(2)?;
                let dest = self.parse_register(operands[0], line_no)?;
                let (offset, base) = self.parse_memory_operand(operands[1], line_no)?;
                Instr::load(opcode, dest, offset, base)
            }
            Opcode::SW | Opcode::SD | Opcode::S_S | Opcode::S_D => {
                expect_count(2)?;
                let value = self.parse_register(operands[0], line_no)?;
                let (offset, base) = self.parse_memory_operand(operands[1], line_no)?;
                Instr::store(opcode, value, offset, base)
            }
            Opcode::BEQ | Opcode::BNE => {
                expect_count(3)?;
                Instr::branch(opcode,
                              self.parse_register(operands[0], line_no)?,
                              self.parse_register(operands[1], line_no)?,
                              self.parse_immediate(operands[2], line_no)?)
            }
        };

        Ok(instr.with_line(line_no))
    }

    fn parse_register(&self, name: &str, line_no: usize) -> Result<Reg, LoadError> {
        get_register(name).ok_or_else(|| {
            LoadError::ParseError(format!("Illegal register '{}' at line {}", name, line_no))
        })
    }

    fn parse_immediate(&self, text: &str, line_no: usize) -> Result<i32, LoadError> {
        let digits = text.strip_prefix('#').unwrap_or(text);
        digits.parse().map_err(|_| {
            LoadError::ParseError(format!("Illegal immediate '{}' at line {}", text, line_no))
        })
    }

    // `offset(base)`, e.g. `8(R1)`
    fn parse_memory_operand(&self, text: &str, line_no: usize) -> Result<(i32, Reg), LoadError> {
        let captures = self.memory_operand_pattern.captures(text).ok_or_else(|| {
            LoadError::ParseError(format!("Expected offset(base) but found '{}' at line {}", text, line_no))
        })?;

        let offset = self.parse_immediate(captures.get(1).map_or("", |m| m.as_str()), line_no)?;
        let base = self.parse_register(captures.get(2).map_or("", |m| m.as_str()), line_no)?;
        Ok((offset, base))
    }
}

// '#' only starts a comment at the beginning of a line; elsewhere it prefixes an immediate.
fn strip_comment(line: &str) -> &str {
    if line.trim_start().starts_with('#') {
        return "";
    }

    let end = [line.find(';'), line.find("//")]
        .iter()
        .flatten()
        .min()
        .copied()
        .unwrap_or(line.len());
    &line[..end]
}

pub fn parse_program(src: &str) -> Result<Vec<Instr>, LoadError> {
    let mut loader = Loader::new()?;
    loader.load(src)?;
    Ok(loader.code)
}

pub fn load(path: &str) -> Result<Vec<Instr>, LoadError> {
    let input = fs::read_to_string(path).map_err(|err| {
        LoadError::IOError(format!("Error reading file '{}': {}", path, err))
    })?;
    parse_program(&input)
}
