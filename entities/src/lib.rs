pub mod local_kv;
