//! Persistence collaborator: player records and ratings in Supabase

pub mod profiles;
pub mod supabase;

pub use profiles::ProfileStore;
pub use supabase::SupabaseClient;
