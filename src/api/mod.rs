pub mod server_config_dto;
