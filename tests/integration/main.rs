mod aws;
mod provisioning;
mod site;
mod test_utils;
