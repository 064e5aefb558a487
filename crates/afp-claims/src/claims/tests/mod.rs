mod common;
mod links;
