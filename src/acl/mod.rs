pub mod owner;
pub mod structures;

pub use owner::{OwnerKind, RecordOwner};
pub use structures::{LdapSid, SecurityDescriptor};
