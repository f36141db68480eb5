pub mod groups;
pub mod organizations;
pub mod users;

pub use groups::{Column as GroupColumn, Entity as Group, Model as GroupModel};
pub use organizations::{
    Column as OrganizationColumn, Entity as Organization, Model as OrganizationModel,
};
pub use users::{Column as UserColumn, Entity as User, Model as UserModel};
