mod build;
mod generate;
mod layout;
mod list;
mod provision;
mod render;
mod status;

pub(crate) use build::{build, BuildOptions};
pub(crate) use generate::generate;
pub(crate) use layout::GlobalArgs;
pub(crate) use list::list;
pub(crate) use provision::provision;
pub(crate) use render::render;
pub(crate) use status::status;
