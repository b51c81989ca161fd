mod support;

mod breakpoints;
mod faults;
mod lifecycle;
mod pause_ledger;
