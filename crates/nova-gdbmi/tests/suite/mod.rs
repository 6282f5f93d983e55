mod logpoints;
mod memory;
mod session;
mod variables;
