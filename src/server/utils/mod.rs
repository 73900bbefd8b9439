pub mod ad_pattern_utils;
pub mod header_utils;
pub mod host_utils;
pub mod html_tree;
pub mod page_utils;
pub mod sanitize_utils;
pub mod vidsrc_utils;
