pub mod escape_html;
pub mod write_file;
