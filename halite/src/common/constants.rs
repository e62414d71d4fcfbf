// doc constants
pub const DOC_ID: &str = "_id";
pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";
pub const FIELD_SEPARATOR: char = '.';

// persistence record markers; these keys never appear in live documents
pub const DELETED_MARKER: &str = "$$deleted";
pub const INDEX_CREATED_MARKER: &str = "$$indexCreated";
pub const INDEX_REMOVED_MARKER: &str = "$$indexRemoved";

// index descriptor fields used inside $$indexCreated markers
pub const INDEX_FIELD_NAME: &str = "fieldName";
pub const INDEX_UNIQUE: &str = "unique";
pub const INDEX_SPARSE: &str = "sparse";
pub const INDEX_EXPIRE_AFTER: &str = "expireAfterSeconds";

// primary key generation
pub const ID_LENGTH: usize = 16;
pub const ID_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

// wire format
pub const DATE_MARKER: &str = "$$date";

pub const HALITE_VERSION: &str = env!("CARGO_PKG_VERSION");
