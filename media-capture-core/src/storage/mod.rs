pub mod object_urls;
