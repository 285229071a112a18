//! C-callable entry points of the shard library.

use std::ffi::{CStr, c_char, c_int, c_longlong};

use crate::domain::shard::shard::{self, ServerInstance};

#[allow(non_camel_case_types)]
#[repr(C)]
pub struct server_instance_t {
    pub hostname: *const c_char,
    pub port: c_int,
}

/// # Safety
/// `instances`, when non-null, must point to `num_instances` valid pointers to
/// `server_instance_t` whose `hostname` is null or a NUL terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pbs_shard_init(max_allowed_servers: c_int, instances: *const *const server_instance_t, num_instances: c_int) -> c_int {
    if instances.is_null() {
        return shard::pbs_shard_init(max_allowed_servers, None);
    }

    let mut list = Vec::with_capacity(num_instances.max(0) as usize);
    for i in 0..num_instances.max(0) as usize {
        let instance = unsafe { *instances.add(i) };
        if instance.is_null() {
            return -1;
        }
        let instance = unsafe { &*instance };
        let hostname =
            if instance.hostname.is_null() { String::new() } else { unsafe { CStr::from_ptr(instance.hostname) }.to_string_lossy().into_owned() };
        list.push(ServerInstance { hostname, port: instance.port });
    }
    shard::pbs_shard_init(max_allowed_servers, Some(&list))
}

/// # Safety
/// `obj_id` must be null or a NUL terminated string. `inactive_servers` must be null
/// or point to a `-1` terminated array (at most the configured server count is read).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pbs_shard_get_server_byindex(obj_type: c_int, obj_id: *const c_char, inactive_servers: *const c_int) -> c_int {
    let obj_id = if obj_id.is_null() { None } else { Some(unsafe { CStr::from_ptr(obj_id) }.to_string_lossy().into_owned()) };

    let inactive = if inactive_servers.is_null() {
        None
    } else {
        let mut list = Vec::new();
        for i in 0..shard::pbs_shard_configured_num_servers() {
            let index = unsafe { *inactive_servers.add(i) };
            if index == -1 {
                break;
            }
            list.push(index);
        }
        Some(list)
    };

    shard::pbs_shard_get_server_byindex(obj_type, obj_id.as_deref(), inactive.as_deref())
}

#[unsafe(no_mangle)]
pub extern "C" fn pbs_shard_get_next_seqid(curr_seq_id: c_longlong, max_seq_id: c_longlong, svr_index: c_int) -> c_longlong {
    shard::pbs_shard_get_next_seqid(curr_seq_id, max_seq_id, svr_index)
}
