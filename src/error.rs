use autoshard_ir::strategy::InstructionId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("a strategy of instruction {instruction} has no resharding costs for operand {operand}")]
    MissingReshardingCosts {
        instruction: InstructionId,
        operand: usize,
    },
    #[error("instruction {instruction} is a tuple where a single value is required")]
    NotALeaf { instruction: InstructionId },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
