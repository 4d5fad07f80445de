pub mod form_template;
pub mod listing_template;
