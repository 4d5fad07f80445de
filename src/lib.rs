//! Admin console for the EduCoin family tasks platform: screen controllers
//! over a swappable backend service, plus the page-window math every list
//! view shares.

pub mod admin;
pub mod auth;
pub mod errors;
pub mod logging;
pub mod manage_categories;
pub mod manage_children;
pub mod manage_gifts;
pub mod manage_levels;
pub mod manage_notifications;
pub mod manage_parents;
pub mod manage_payments;
pub mod manage_plans;
pub mod manage_tasks;
pub mod manage_word_games;
pub mod pagination;
pub mod rest;
pub mod security;
pub mod services;
pub mod templates;
