//! Remote store access over Supabase's PostgREST API.

mod client;

pub use client::SupabaseClient;
