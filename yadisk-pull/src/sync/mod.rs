pub mod apply;
pub mod confirm;
pub mod model;
pub mod paths;
pub mod progress;
pub mod pull;
pub mod remote;
pub mod resolver;

#[cfg(test)]
mod test_support;
