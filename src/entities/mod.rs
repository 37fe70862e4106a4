pub mod access_token;
pub mod permission;
pub mod role;
pub mod user;

pub use access_token::Entity as AccessToken;
pub use permission::Entity as Permission;
pub use role::Entity as Role;
pub use user::Entity as User;
