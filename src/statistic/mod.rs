/// Trading performance metrics calculated over closed positions & equity
/// curves.
pub mod metric;
