mod api;
mod pages;

pub use api::{healthz, submission_status};
pub use pages::{
    add_resource, delete_resource, grade, index, login, logout, register, save_attendance, submit,
    update_profile, upload_for_trainee,
};
