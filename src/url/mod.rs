//! URL handling for wiki endpoints
//!
//! This module resolves link hrefs back into page titles, extracts site
//! domains, and builds the request URLs for each parsed-content API flavor.

mod domain;
mod endpoint;
mod title;

pub use domain::{extract_domain, wiki_domain};
pub use endpoint::{action_api_url, parsoid_endpoint, select_api, Endpoint};
pub use title::{canonical_file_title, encode_title, resolve_title, ArticlePath};
