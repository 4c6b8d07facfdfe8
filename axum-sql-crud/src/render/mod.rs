//! HTML rendering of list, record and message pages

pub mod html;
pub mod record;
pub mod table;

pub use record::{render_delete_confirmation, render_message, render_record};
pub use table::{render_download_links, render_pagination, render_search_form, render_table, RenderedTable};
