mod email;
mod invariants;
mod tokens;
