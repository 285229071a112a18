pub mod work_task;
