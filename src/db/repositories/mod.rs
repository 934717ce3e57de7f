mod break_credits;
mod focus_sessions;
mod parent_settings;
