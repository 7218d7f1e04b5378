use strum::{Display, EnumString};

//
// Public Interface
//

/// Weak memory models supported by the checkers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum MemoryModel {
    TSO,
    ARM8,
    Power,
    RiscV,
    IMM,
    GIMM,
    RC11,
    VMM,
}

impl MemoryModel {
    /// Name of the cat file describing the model.
    pub fn cat_file(self) -> &'static str {
        match self {
            MemoryModel::TSO => "tso.cat",
            MemoryModel::ARM8 => "aarch64.cat",
            MemoryModel::Power => "power.cat",
            MemoryModel::RiscV => "riscv.cat",
            MemoryModel::IMM => "imm.cat",
            MemoryModel::GIMM => "genmc-imm.cat",
            MemoryModel::RC11 => "rc11.cat",
            MemoryModel::VMM => "vmm.cat",
        }
    }

    /// Architecture tag passed to SMT-backed tools.
    pub fn arch(self) -> &'static str {
        match self {
            MemoryModel::TSO => "tso",
            MemoryModel::ARM8 => "arm8",
            MemoryModel::Power => "power",
            MemoryModel::RiscV => "riscv",
            MemoryModel::IMM | MemoryModel::GIMM => "imm",
            MemoryModel::RC11 | MemoryModel::VMM => "c11",
        }
    }
}
