
pub use btb::MockBtb;
pub use direction::MockDirection;
pub use indirect::MockIndirect;
pub use ras::MockRas;
