pub mod edit_log;
pub mod edit_log_change;
pub mod item;
pub mod neighbor;
pub mod neighbor_history;
pub mod purchase;
pub mod purchase_line_item;
