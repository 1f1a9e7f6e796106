//! sea-orm entities. Every table uses UUID keys and `before_save` keeps the
//! id and timestamps populated.

pub mod assembly;
pub mod assembly_category;
pub mod assembly_group;
pub mod assembly_group_item;
pub mod assembly_material;
pub mod client;
pub mod material;
pub mod notification;
pub mod project;
pub mod project_milestone;
pub mod project_task;
pub mod template;
pub mod template_assembly;
pub mod template_group;
pub mod upload;
pub mod user;
